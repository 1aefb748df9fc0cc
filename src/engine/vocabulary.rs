//! Adding words to a profile's vocabulary: dictionary lookup, model
//! translation for unknown words, atomic attach.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::SrConfig;
use crate::engine::validator;
use crate::llm::LlmGateway;
use crate::response::AppError;
use crate::store::operations::profiles::Profile;
use crate::store::operations::user_words::UserWord;
use crate::store::operations::users::User;
use crate::store::operations::words::Word;
use crate::store::{retry_transient, Store, StoreError};

/// 用户输入的生词长度上限
const MAX_WORD_LEN: usize = 64;

#[derive(Debug)]
pub struct AddWordOutcome {
    pub word: Word,
    pub user_word: UserWord,
    /// Translations into the user's native language, for the confirmation
    /// message.
    pub translations: Vec<String>,
    /// The word was already in this profile's vocabulary.
    pub already_known: bool,
}

/// Add `raw_text` (a word in the profile's target language) to the
/// vocabulary. Unknown words are translated by the model; the dictionary
/// entry and the vocabulary attachment commit in one transaction.
pub async fn add_word(
    store: &Store,
    gateway: &LlmGateway,
    user: &User,
    profile: &Profile,
    raw_text: &str,
    sr_cfg: &SrConfig,
    now: DateTime<Utc>,
) -> Result<AddWordOutcome, AppError> {
    let text = validator::normalize(raw_text);
    if text.is_empty() {
        return Err(AppError::invalid_input("word must not be empty"));
    }
    if text.chars().count() > MAX_WORD_LEN {
        return Err(AppError::invalid_input("word is too long"));
    }

    // 先查共享词典；已有词条直接挂接，无需外呼
    let existing = store.find_word_by_text(&profile.target_lang, &text)?;
    let (word, is_new) = match existing {
        Some(word) => {
            let word = ensure_native_translations(store, gateway, user, word).await?;
            (word, false)
        }
        None => {
            let payload = gateway
                .translate(&text, &profile.target_lang, &user.native_lang)
                .await?;
            let mut translations = BTreeMap::new();
            translations.insert(user.native_lang.clone(), payload.translations);
            (
                Word {
                    id: uuid::Uuid::new_v4().to_string(),
                    text: text.clone(),
                    language: profile.target_lang.clone(),
                    // 习得时以档案自评等级入池，供干扰项选取
                    cefr: Some(profile.cefr),
                    translations,
                    examples: payload.examples,
                    forms: payload.forms,
                    freq_rank: None,
                    created_at: now,
                },
                true,
            )
        }
    };

    let user_word = UserWord::new(
        &uuid::Uuid::new_v4().to_string(),
        &profile.id,
        &word.id,
        sr_cfg.default_ef,
        now,
    );

    let new_word = if is_new { Some(&word) } else { None };
    let result = retry_transient("vocabulary_add", || {
        store.add_vocabulary_entry(new_word, &user_word)
    })
    .await;

    match result {
        Ok(()) => {
            tracing::info!(
                user_id = %user.id,
                profile_id = %profile.id,
                word = %word.text,
                created = is_new,
                "Word added to vocabulary"
            );
            let translations = word
                .translations
                .get(&user.native_lang)
                .cloned()
                .unwrap_or_default();
            Ok(AddWordOutcome {
                word,
                user_word,
                translations,
                already_known: false,
            })
        }
        // 词条创建竞态：另一请求先写入了同一 (language, text)，复用已有词条重试挂接
        Err(StoreError::Conflict { entity, .. }) if entity == "word_text" => {
            let word = store
                .find_word_by_text(&profile.target_lang, &text)?
                .ok_or_else(|| AppError::internal("word vanished after text conflict"))?;
            let user_word = UserWord::new(
                &uuid::Uuid::new_v4().to_string(),
                &profile.id,
                &word.id,
                sr_cfg.default_ef,
                now,
            );
            match store.add_vocabulary_entry(None, &user_word) {
                Ok(()) => {
                    let translations = word
                        .translations
                        .get(&user.native_lang)
                        .cloned()
                        .unwrap_or_default();
                    Ok(AddWordOutcome {
                        word,
                        user_word,
                        translations,
                        already_known: false,
                    })
                }
                Err(e) => already_known_or_err(store, profile, word, user, e),
            }
        }
        Err(e) => already_known_or_err(store, profile, word, user, e),
    }
}

fn already_known_or_err(
    store: &Store,
    profile: &Profile,
    word: Word,
    user: &User,
    err: StoreError,
) -> Result<AddWordOutcome, AppError> {
    match err {
        StoreError::Conflict { entity, .. } if entity == "user_word" => {
            let user_word = store
                .find_user_word(&profile.id, &word.id)?
                .ok_or_else(|| AppError::internal("vocabulary entry vanished after conflict"))?;
            let translations = word
                .translations
                .get(&user.native_lang)
                .cloned()
                .unwrap_or_default();
            Ok(AddWordOutcome {
                word,
                user_word,
                translations,
                already_known: true,
            })
        }
        other => Err(other.into()),
    }
}

/// Existing dictionary entries may predate this user's native language;
/// fill the gap with one model call and merge.
async fn ensure_native_translations(
    store: &Store,
    gateway: &LlmGateway,
    user: &User,
    mut word: Word,
) -> Result<Word, AppError> {
    if word
        .translations
        .get(&user.native_lang)
        .map(|list| !list.is_empty())
        .unwrap_or(false)
    {
        return Ok(word);
    }

    let payload = gateway
        .translate(&word.text, &word.language, &user.native_lang)
        .await?;
    word.translations
        .insert(user.native_lang.clone(), payload.translations);
    if word.examples.is_empty() {
        word.examples = payload.examples;
    }
    if word.forms.is_empty() {
        word.forms = payload.forms;
    }
    store.update_word(&word)?;
    Ok(word)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::config::LlmConfig;
    use crate::store::operations::words::Cefr;

    use super::*;

    fn setup(enabled: bool) -> (tempfile::TempDir, Arc<Store>, LlmGateway) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let llm = LlmConfig {
            enabled,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test".to_string(),
            rate_per_min: 100,
            max_inflight: 2,
            circuit_fail_threshold: 5,
            circuit_recovery_secs: 60,
            call_timeout_secs: 1,
        };
        let gateway = LlmGateway::new(&llm, store.clone());
        (dir, store, gateway)
    }

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            native_lang: "ru".to_string(),
            interface_lang: "ru".to_string(),
            tz: "Europe/Moscow".to_string(),
            notifications_on: true,
            last_active_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn sample_profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            target_lang: "en".to_string(),
            cefr: Cefr::A1,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn new_word_is_translated_and_attached() {
        let (_dir, store, gateway) = setup(true);
        let outcome = add_word(
            &store,
            &gateway,
            &sample_user(),
            &sample_profile(),
            "House",
            &SrConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(!outcome.already_known);
        assert_eq!(outcome.word.text, "house");
        assert_eq!(outcome.translations, vec!["house@ru"]);

        let stored = store.find_word_by_text("en", "house").unwrap().unwrap();
        assert_eq!(stored.id, outcome.word.id);
        assert!(store.find_user_word("p1", &stored.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn adding_twice_reports_already_known() {
        let (_dir, store, gateway) = setup(true);
        let user = sample_user();
        let profile = sample_profile();
        let sr = SrConfig::default();

        add_word(&store, &gateway, &user, &profile, "house", &sr, Utc::now())
            .await
            .unwrap();
        let second = add_word(&store, &gateway, &user, &profile, "house", &sr, Utc::now())
            .await
            .unwrap();
        assert!(second.already_known);
    }

    #[tokio::test]
    async fn unavailable_gateway_surfaces_error() {
        let (_dir, store, gateway) = setup(false);
        let err = add_word(
            &store,
            &gateway,
            &sample_user(),
            &sample_profile(),
            "house",
            &SrConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, crate::response::codes::CIRCUIT_OPEN);
    }

    #[tokio::test]
    async fn empty_word_is_invalid() {
        let (_dir, store, gateway) = setup(true);
        let err = add_word(
            &store,
            &gateway,
            &sample_user(),
            &sample_profile(),
            "   ",
            &SrConfig::default(),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, crate::response::codes::INVALID_INPUT);
    }
}
