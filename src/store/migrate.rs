use crate::store::keys;
use crate::store::operations::words::Word;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_word_indexes", m002_word_indexes),
        ("003_user_word_due_index", m003_user_word_due_index),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// 迁移设计原则：
/// - **幂等性要求**：每个迁移函数必须是幂等的，即重复执行不会产生副作用。
///   迁移可能在 func() 成功但 set_version() 之前因进程崩溃而中断，
///   重启后会重新执行该迁移。
/// - **进度检查点**：版本号在每个迁移成功后立即持久化。
/// - **仅向前**：set_version 拒绝降级，防止意外回滚。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().unwrap_or([0; 4]);
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuild the word text and level indexes from the words tree. Safe to
/// re-run: keys are derived from word fields, inserts overwrite in place.
fn m002_word_indexes(store: &Store) -> Result<(), StoreError> {
    for item in store.words.iter() {
        let (_, value) = item?;
        let word: Word = Store::deserialize(&value)?;

        let text_key = keys::word_text_index_key(&word.language, &word.text);
        store
            .word_text_index
            .insert(text_key.as_bytes(), word.id.as_bytes())?;

        if let Some(cefr) = &word.cefr {
            let level_key =
                keys::words_by_level_key(&word.language, cefr.as_str(), word.freq_rank, &word.id);
            store
                .words_by_level
                .insert(level_key.as_bytes(), word.id.as_bytes())?;
        }
    }

    Ok(())
}

/// Rebuild the due index from the user_words tree. Keys derive from row
/// fields, so re-running overwrites in place.
fn m003_user_word_due_index(store: &Store) -> Result<(), StoreError> {
    use crate::store::operations::user_words::UserWord;

    for item in store.user_words.iter() {
        let (_, value) = item?;
        let user_word: UserWord = Store::deserialize(&value)?;

        if let Some(next_review_at) = user_word.next_review_at {
            let due_key = keys::user_word_due_key(
                &user_word.profile_id,
                next_review_at.timestamp_millis(),
                &user_word.id,
            );
            store
                .user_words_due
                .insert(due_key.as_bytes(), user_word.id.as_bytes())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        run(&store).unwrap();
        let first = get_current_version(&store).unwrap();
        run(&store).unwrap();
        let second = get_current_version(&store).unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn downgrade_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db2");
        let store = Store::open(path.to_str().unwrap()).unwrap();

        set_version(&store, 2).unwrap();
        let err = set_version(&store, 1).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }
}
