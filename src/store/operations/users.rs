use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

/// 聊天侧身份即主键：id 由传输层下发，本服务不做账号体系。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub native_lang: String,
    pub interface_lang: String,
    pub tz: String,
    pub notifications_on: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Registration dialog progress, one row per user while the dialog runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum DialogState {
    AwaitingNativeLang,
    AwaitingTargetLang { native_lang: String },
    AwaitingCefr { native_lang: String, target_lang: String },
}

impl Store {
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id);
        let bytes = Self::serialize(user)?;
        match self
            .users
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::Conflict {
                entity: "user".to_string(),
                key: user.id.clone(),
            }),
        }
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(user_id);
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 使用 CAS 保护用户更新，防止并发写入丢失。
    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let key = keys::user_key(&user.id);
        let new_bytes = Self::serialize(user)?;

        for _ in 0..MAX_CAS_RETRIES {
            let old_raw = self.users.get(key.as_bytes())?;
            if old_raw.is_none() {
                return Err(StoreError::NotFound {
                    entity: "user".to_string(),
                    key: user.id.clone(),
                });
            }
            match self
                .users
                .compare_and_swap(key.as_bytes(), old_raw, Some(new_bytes.as_slice()))?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "user".to_string(),
            key: user.id.clone(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Update `last_active_at` in place. Called on every inbound interaction.
    pub fn touch_last_active(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut user) = self.get_user(user_id)? {
            user.last_active_at = now;
            self.update_user(&user)?;
        }
        Ok(())
    }

    pub fn set_notifications(&self, user_id: &str, on: bool) -> Result<User, StoreError> {
        let mut user = self
            .get_user(user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "user".to_string(),
                key: user_id.to_string(),
            })?;
        user.notifications_on = on;
        self.update_user(&user)?;
        Ok(user)
    }

    /// Full user scan for the reminder sweep. The user population of a chat
    /// bot is small enough to walk in one pass.
    pub fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for item in self.users.iter() {
            let (_, raw) = item?;
            users.push(Self::deserialize::<User>(&raw)?);
        }
        Ok(users)
    }

    pub fn get_dialog_state(&self, user_id: &str) -> Result<Option<DialogState>, StoreError> {
        let key = keys::dialog_state_key(user_id);
        match self.dialog_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_dialog_state(&self, user_id: &str, state: &DialogState) -> Result<(), StoreError> {
        let key = keys::dialog_state_key(user_id);
        self.dialog_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }

    pub fn clear_dialog_state(&self, user_id: &str) -> Result<(), StoreError> {
        let key = keys::dialog_state_key(user_id);
        self.dialog_states.remove(key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn sample_user(id: &str) -> User {
        User {
            id: id.to_string(),
            native_lang: "ru".to_string(),
            interface_lang: "ru".to_string(),
            tz: "Europe/Moscow".to_string(),
            notifications_on: true,
            last_active_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_twice_conflicts() {
        let (_dir, store) = test_store();
        let user = sample_user("u1");
        store.create_user(&user).unwrap();
        let err = store.create_user(&user).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn touch_updates_last_active() {
        let (_dir, store) = test_store();
        let mut user = sample_user("u1");
        user.last_active_at = Utc::now() - chrono::Duration::hours(10);
        store.create_user(&user).unwrap();

        let now = Utc::now();
        store.touch_last_active("u1", now).unwrap();
        let loaded = store.get_user("u1").unwrap().unwrap();
        assert_eq!(loaded.last_active_at, now);
    }

    #[test]
    fn dialog_state_roundtrip_and_clear() {
        let (_dir, store) = test_store();
        let state = DialogState::AwaitingTargetLang {
            native_lang: "ru".to_string(),
        };
        store.set_dialog_state("u1", &state).unwrap();
        assert_eq!(store.get_dialog_state("u1").unwrap(), Some(state));

        store.clear_dialog_state("u1").unwrap();
        assert!(store.get_dialog_state("u1").unwrap().is_none());
    }
}
