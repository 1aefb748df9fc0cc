//! Command routing: inbound chat updates → engine calls → reply actions.
//! Every terminal error becomes a localized message; nothing internal leaks
//! to the chat surface.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::commands::{self, ChoicePayload, Command};
use crate::chat::messages::{self, Locale};
use crate::chat::types::ReplyAction;
use crate::config::{Config, SrConfig};
use crate::engine::validator::Feedback;
use crate::engine::{vocabulary, AnswerInput, LessonEngine, StartOutcome};
use crate::llm::LlmGateway;
use crate::response::{codes, AppError};
use crate::store::operations::lessons::PendingQuestion;
use crate::store::operations::profiles::Profile;
use crate::store::operations::users::{DialogState, User};
use crate::store::operations::word_stats::TestType;
use crate::store::operations::words::Cefr;
use crate::store::Store;

pub struct ChatService {
    store: Arc<Store>,
    gateway: Arc<LlmGateway>,
    engine: LessonEngine,
    sr_cfg: SrConfig,
    default_tz: String,
}

impl ChatService {
    pub fn new(store: Arc<Store>, gateway: Arc<LlmGateway>, config: &Config) -> Self {
        let engine = LessonEngine::new(
            store.clone(),
            gateway.clone(),
            config.lesson.clone(),
            config.sr.clone(),
        );
        Self {
            store,
            gateway,
            engine,
            sr_cfg: config.sr.clone(),
            default_tz: config.default_tz.clone(),
        }
    }

    pub async fn on_message(
        &self,
        user_id: &str,
        text: &str,
        ts: DateTime<Utc>,
    ) -> Vec<ReplyAction> {
        match self.handle_message(user_id, text, ts).await {
            Ok(actions) => actions,
            Err(err) => self.error_reply(user_id, err).await,
        }
    }

    pub async fn on_choice(
        &self,
        user_id: &str,
        payload: &str,
        ts: DateTime<Utc>,
    ) -> Vec<ReplyAction> {
        match self.handle_choice(user_id, payload, ts).await {
            Ok(actions) => actions,
            Err(err) => self.error_reply(user_id, err).await,
        }
    }

    async fn handle_message(
        &self,
        user_id: &str,
        text: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let user = self.store.get_user(user_id)?;
        let Some(user) = user else {
            return self.registration_step(user_id, text, ts);
        };
        self.store.touch_last_active(user_id, ts)?;
        let locale = Locale::from_code(&user.interface_lang);

        match commands::parse_message(text) {
            Command::Start => Ok(vec![ReplyAction::text(messages::already_registered(
                locale,
            ))]),
            Command::AddWord(word) => self.add_word_flow(&user, &word, ts).await,
            Command::StartLesson => self.start_lesson_flow(&user, ts).await,
            Command::ShowStats => self.stats_flow(&user, ts),
            Command::ToggleNotifications => {
                let updated = self.store.set_notifications(user_id, !user.notifications_on)?;
                Ok(vec![ReplyAction::text(messages::notifications_toggled(
                    locale,
                    updated.notifications_on,
                ))])
            }
            Command::SwitchLanguage(lang) => self.switch_language_flow(&user, &lang, ts),
            Command::Text(input) => {
                let profile = self.active_profile(&user)?;
                let open = self
                    .store
                    .get_active_lesson(&profile.id)?
                    .and_then(|lesson| lesson.current);
                match open {
                    Some(question) => {
                        self.answer_flow(&user, &profile, &question, AnswerInput::Text(&input), ts)
                            .await
                    }
                    None if looks_like_word(&input) => {
                        self.add_word_flow(&user, &input, ts).await
                    }
                    None => Ok(vec![ReplyAction::text(messages::unknown_input(locale))]),
                }
            }
        }
    }

    async fn handle_choice(
        &self,
        user_id: &str,
        payload: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let user = self.store.get_user(user_id)?;
        let Some(user) = user else {
            return self.registration_step(user_id, payload, ts);
        };
        self.store.touch_last_active(user_id, ts)?;
        let locale = Locale::from_code(&user.interface_lang);

        let profile = self.active_profile(&user)?;
        let open = self
            .store
            .get_active_lesson(&profile.id)?
            .and_then(|lesson| lesson.current);
        let Some(question) = open else {
            return Ok(vec![
                ReplyAction::ClearOptions,
                ReplyAction::text(messages::no_active_lesson(locale)),
            ]);
        };

        let payload = commands::parse_choice(payload);
        let input = match &payload {
            ChoicePayload::Index(index) => AnswerInput::Choice(*index),
            ChoicePayload::Value(value) => AnswerInput::Text(value),
        };
        self.answer_flow(&user, &profile, &question, input, ts).await
    }

    /// Registration dialog: native language → target language → CEFR.
    fn registration_step(
        &self,
        user_id: &str,
        input: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let lang_options: Vec<String> = messages::SUPPORTED_LANGS
            .iter()
            .map(|code| code.to_string())
            .collect();

        match self.store.get_dialog_state(user_id)? {
            None => {
                self.store
                    .set_dialog_state(user_id, &DialogState::AwaitingNativeLang)?;
                Ok(vec![
                    ReplyAction::text(messages::welcome()),
                    ReplyAction::options("", lang_options),
                ])
            }
            Some(DialogState::AwaitingNativeLang) => {
                let code = input.trim().to_lowercase();
                if !messages::is_supported_lang(&code) {
                    return Ok(vec![
                        ReplyAction::text(messages::invalid_language(Locale::En)),
                        ReplyAction::options("", lang_options),
                    ]);
                }
                let locale = Locale::from_code(&code);
                let targets: Vec<String> = lang_options
                    .into_iter()
                    .filter(|c| *c != code)
                    .collect();
                self.store.set_dialog_state(
                    user_id,
                    &DialogState::AwaitingTargetLang { native_lang: code },
                )?;
                Ok(vec![
                    ReplyAction::text(messages::ask_target_lang(locale)),
                    ReplyAction::options("", targets),
                ])
            }
            Some(DialogState::AwaitingTargetLang { native_lang }) => {
                let locale = Locale::from_code(&native_lang);
                let code = input.trim().to_lowercase();
                if !messages::is_supported_lang(&code) {
                    return Ok(vec![ReplyAction::text(messages::invalid_language(locale))]);
                }
                if code == native_lang {
                    return Ok(vec![ReplyAction::text(messages::same_language(locale))]);
                }
                self.store.set_dialog_state(
                    user_id,
                    &DialogState::AwaitingCefr {
                        native_lang,
                        target_lang: code,
                    },
                )?;
                let levels: Vec<String> =
                    Cefr::ALL.iter().map(|l| l.as_str().to_string()).collect();
                Ok(vec![
                    ReplyAction::text(messages::ask_cefr(locale)),
                    ReplyAction::options("", levels),
                ])
            }
            Some(DialogState::AwaitingCefr {
                native_lang,
                target_lang,
            }) => {
                let locale = Locale::from_code(&native_lang);
                let Ok(cefr) = Cefr::from_str(input) else {
                    return Ok(vec![ReplyAction::text(messages::invalid_cefr(locale))]);
                };

                let user = User {
                    id: user_id.to_string(),
                    native_lang: native_lang.clone(),
                    interface_lang: native_lang,
                    tz: self.default_tz.clone(),
                    notifications_on: true,
                    last_active_at: ts,
                    created_at: ts,
                };
                self.store.create_user(&user)?;
                self.store.create_profile(&Profile {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    target_lang: target_lang.clone(),
                    cefr,
                    active: true,
                    created_at: ts,
                })?;
                self.store.clear_dialog_state(user_id)?;
                tracing::info!(user_id, target_lang = %target_lang, "User registered");

                Ok(vec![
                    ReplyAction::ClearOptions,
                    ReplyAction::text(messages::registered(locale, &target_lang)),
                ])
            }
        }
    }

    async fn add_word_flow(
        &self,
        user: &User,
        word: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let locale = Locale::from_code(&user.interface_lang);
        let profile = self.active_profile(user)?;

        match vocabulary::add_word(
            &self.store,
            &self.gateway,
            user,
            &profile,
            word,
            &self.sr_cfg,
            ts,
        )
        .await
        {
            Ok(outcome) if outcome.already_known => Ok(vec![ReplyAction::text(
                messages::word_already_known(locale, &outcome.word.text),
            )]),
            Ok(outcome) => Ok(vec![ReplyAction::text(messages::word_added(
                locale,
                &outcome.word.text,
                &outcome.translations,
            ))]),
            Err(err) => match err.code.as_str() {
                codes::INVALID_INPUT => {
                    Ok(vec![ReplyAction::text(messages::invalid_word(locale))])
                }
                codes::CIRCUIT_OPEN | codes::TRANSIENT_MODEL | codes::TIMEOUT
                | codes::MODEL_SHAPE => Ok(vec![ReplyAction::text(
                    messages::translation_unavailable(locale),
                )]),
                _ => Err(err),
            },
        }
    }

    async fn start_lesson_flow(
        &self,
        user: &User,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let locale = Locale::from_code(&user.interface_lang);
        let profile = self.active_profile(user)?;

        match self.engine.start_lesson(user, &profile, ts).await? {
            StartOutcome::Started { lesson, question } => Ok(vec![
                ReplyAction::text(messages::lesson_started(locale, lesson.planned_count)),
                render_question(locale, &question),
            ]),
            StartOutcome::Resumed { question, .. } => Ok(vec![
                ReplyAction::text(messages::lesson_resumed(locale)),
                render_question(locale, &question),
            ]),
            StartOutcome::EmptyVocabulary => {
                Ok(vec![ReplyAction::text(messages::lesson_empty(locale))])
            }
        }
    }

    async fn answer_flow(
        &self,
        user: &User,
        profile: &Profile,
        question: &PendingQuestion,
        input: AnswerInput<'_>,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let locale = Locale::from_code(&user.interface_lang);

        let outcome = match self.engine.answer(user, profile, input, ts).await {
            Ok(outcome) => outcome,
            Err(err) if err.code == codes::NOT_FOUND => {
                return Ok(vec![ReplyAction::text(messages::no_active_lesson(locale))]);
            }
            Err(err) => return Err(err),
        };

        let mut actions = Vec::new();
        if question.test_type == TestType::Choice {
            actions.push(ReplyAction::ClearOptions);
        }

        let feedback = match (&outcome.verdict.feedback, outcome.verdict.correct) {
            (Feedback::None, true) => messages::answer_correct(locale),
            (Feedback::None, false) => messages::answer_wrong(locale, &question.expected),
            (Feedback::Typo { expected }, _) => messages::answer_typo(locale, expected),
            (Feedback::Comment(comment), _) => comment.clone(),
            (Feedback::Expected { expected }, _) => messages::answer_wrong(locale, expected),
        };
        actions.push(ReplyAction::text(feedback));

        if let Some(next) = &outcome.next {
            actions.push(render_question(locale, next));
        }
        if let Some(summary) = &outcome.summary {
            actions.push(ReplyAction::text(messages::lesson_summary(locale, summary)));
        }
        Ok(actions)
    }

    fn stats_flow(&self, user: &User, now: DateTime<Utc>) -> Result<Vec<ReplyAction>, AppError> {
        let locale = Locale::from_code(&user.interface_lang);
        let profile = self.active_profile(user)?;
        let counts = self.store.vocabulary_counts(&profile.id)?;
        let due_now = self.store.count_due_user_words(&profile.id, now)?;
        Ok(vec![ReplyAction::text(messages::stats(
            locale, &counts, due_now,
        ))])
    }

    fn switch_language_flow(
        &self,
        user: &User,
        lang: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vec<ReplyAction>, AppError> {
        let locale = Locale::from_code(&user.interface_lang);
        let code = lang.trim().to_lowercase();
        if !messages::is_supported_lang(&code) {
            return Ok(vec![ReplyAction::text(messages::invalid_language(locale))]);
        }
        if code == user.native_lang {
            return Ok(vec![ReplyAction::text(messages::same_language(locale))]);
        }

        match self.store.find_profile_by_lang(&user.id, &code)? {
            Some(profile) => {
                self.store.activate_profile(&user.id, &profile.id)?;
            }
            None => {
                // 新语言沿用当前档案的自评等级作为起点
                let cefr = self
                    .store
                    .get_active_profile(&user.id)?
                    .map(|p| p.cefr)
                    .unwrap_or(Cefr::B1);
                let profile = Profile {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user.id.clone(),
                    target_lang: code.clone(),
                    cefr,
                    active: false,
                    created_at: ts,
                };
                self.store.create_profile(&profile)?;
                self.store.activate_profile(&user.id, &profile.id)?;
            }
        }

        tracing::info!(user_id = %user.id, target_lang = %code, "Profile switched");
        Ok(vec![ReplyAction::text(messages::language_switched(
            locale, &code,
        ))])
    }

    fn active_profile(&self, user: &User) -> Result<Profile, AppError> {
        self.store
            .get_active_profile(&user.id)?
            .ok_or_else(|| AppError::not_found("no active profile"))
    }

    async fn error_reply(&self, user_id: &str, err: AppError) -> Vec<ReplyAction> {
        tracing::error!(user_id, code = %err.code, error = %err.message, "Chat command failed");
        let locale = self
            .store
            .get_user(user_id)
            .ok()
            .flatten()
            .map(|u| Locale::from_code(&u.interface_lang))
            .unwrap_or(Locale::En);

        let text = match err.code.as_str() {
            codes::TRANSIENT_STORE => messages::try_again(locale),
            codes::CIRCUIT_OPEN | codes::TRANSIENT_MODEL | codes::TIMEOUT => {
                messages::translation_unavailable(locale)
            }
            _ => messages::try_again(locale),
        };
        vec![ReplyAction::text(text)]
    }
}

fn render_question(locale: Locale, question: &PendingQuestion) -> ReplyAction {
    let prompt = messages::question_prompt(locale, question.direction, &question.prompt);
    match question.test_type {
        TestType::Choice => ReplyAction::options(prompt, question.options.clone()),
        TestType::Input => ReplyAction::text(prompt),
    }
}

fn looks_like_word(input: &str) -> bool {
    let trimmed = input.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('/')
        && trimmed.split_whitespace().count() == 1
        && trimmed.chars().count() <= 64
        && trimmed.chars().any(|c| c.is_alphabetic())
}
