use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::operations::words::Cefr;
use crate::store::{Store, StoreError};

/// Language-learning profile. One user may keep several, at most one active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub target_lang: String,
    pub cefr: Cefr,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Create a profile; `(user_id, target_lang)` uniqueness is checked
    /// inside the transaction via the index tree.
    pub fn create_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let profile_key = keys::profile_key(&profile.id);
        let index_key = keys::profile_user_index_key(&profile.user_id, &profile.target_lang);
        let profile_bytes = Self::serialize(profile)?;
        let profile_id = profile.id.clone();

        let result = (&self.profiles, &self.profile_user_index).transaction(
            |(profiles, user_index)| {
                if user_index.get(index_key.as_bytes())?.is_some() {
                    return sled::transaction::abort(());
                }
                user_index.insert(index_key.as_bytes(), profile_id.as_bytes())?;
                profiles.insert(profile_key.as_bytes(), profile_bytes.as_slice())?;
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "profile".to_string(),
                key: index_key.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })?;

        if profile.active {
            self.active_profiles.insert(
                keys::active_profile_key(&profile.user_id).as_bytes(),
                profile.id.as_bytes(),
            )?;
        }
        Ok(())
    }

    pub fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>, StoreError> {
        let key = keys::profile_key(profile_id);
        match self.profiles.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_active_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let key = keys::active_profile_key(user_id);
        match self.active_profiles.get(key.as_bytes())? {
            Some(profile_id_raw) => {
                let profile_id = String::from_utf8(profile_id_raw.to_vec()).unwrap_or_default();
                self.get_profile(&profile_id)
            }
            None => Ok(None),
        }
    }

    pub fn find_profile_by_lang(
        &self,
        user_id: &str,
        target_lang: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let index_key = keys::profile_user_index_key(user_id, target_lang);
        match self.profile_user_index.get(index_key.as_bytes())? {
            Some(profile_id_raw) => {
                let profile_id = String::from_utf8(profile_id_raw.to_vec()).unwrap_or_default();
                self.get_profile(&profile_id)
            }
            None => Ok(None),
        }
    }

    pub fn list_profiles(&self, user_id: &str) -> Result<Vec<Profile>, StoreError> {
        let prefix = format!("{}:", user_id);
        let mut profiles = Vec::new();
        for item in self.profile_user_index.scan_prefix(prefix.as_bytes()) {
            let (_, profile_id_raw) = item?;
            let profile_id = String::from_utf8(profile_id_raw.to_vec()).unwrap_or_default();
            if let Some(profile) = self.get_profile(&profile_id)? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    /// 使用 CAS 保护档案更新。
    pub fn update_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let key = keys::profile_key(&profile.id);
        let new_bytes = Self::serialize(profile)?;

        for _ in 0..MAX_CAS_RETRIES {
            let old_raw = self.profiles.get(key.as_bytes())?;
            if old_raw.is_none() {
                return Err(StoreError::NotFound {
                    entity: "profile".to_string(),
                    key: profile.id.clone(),
                });
            }
            match self
                .profiles
                .compare_and_swap(key.as_bytes(), old_raw, Some(new_bytes.as_slice()))?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "profile".to_string(),
            key: profile.id.clone(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Make `profile_id` the single active profile of the user, deactivating
    /// the previous one.
    pub fn activate_profile(&self, user_id: &str, profile_id: &str) -> Result<Profile, StoreError> {
        let mut target = self
            .get_profile(profile_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "profile".to_string(),
                key: profile_id.to_string(),
            })?;
        if target.user_id != user_id {
            return Err(StoreError::Validation(
                "profile does not belong to user".into(),
            ));
        }

        if let Some(mut previous) = self.get_active_profile(user_id)? {
            if previous.id != profile_id {
                previous.active = false;
                self.update_profile(&previous)?;
            }
        }

        target.active = true;
        self.update_profile(&target)?;
        self.active_profiles.insert(
            keys::active_profile_key(user_id).as_bytes(),
            profile_id.as_bytes(),
        )?;
        Ok(target)
    }
}
