//! User-facing message catalog, keyed by the user's interface language.
//! Every string the bot sends to chat comes from here.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::store::operations::lessons::LessonSummary;
use crate::store::operations::user_words::VocabularyCounts;
use crate::store::operations::word_stats::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Ru,
}

impl Locale {
    pub fn from_code(code: &str) -> Self {
        match code.to_lowercase().as_str() {
            "ru" => Self::Ru,
            _ => Self::En,
        }
    }
}

/// Display names per supported language code: (English, Russian).
static LANG_DISPLAY: Lazy<HashMap<&'static str, (&'static str, &'static str)>> = Lazy::new(|| {
    HashMap::from([
        ("en", ("English", "английский")),
        ("ru", ("Russian", "русский")),
        ("de", ("German", "немецкий")),
        ("fr", ("French", "французский")),
        ("es", ("Spanish", "испанский")),
        ("it", ("Italian", "итальянский")),
        ("pt", ("Portuguese", "португальский")),
        ("zh", ("Chinese", "китайский")),
    ])
});

/// Codes offered in the registration keyboards.
pub const SUPPORTED_LANGS: [&str; 8] = ["en", "ru", "de", "fr", "es", "it", "pt", "zh"];

pub fn is_supported_lang(code: &str) -> bool {
    LANG_DISPLAY.contains_key(code)
}

pub fn lang_display(locale: Locale, code: &str) -> String {
    match LANG_DISPLAY.get(code) {
        Some((en, ru)) => match locale {
            Locale::En => (*en).to_string(),
            Locale::Ru => (*ru).to_string(),
        },
        None => code.to_string(),
    }
}

// 注册对话在用户选定母语前无界面语言，欢迎语使用双语
pub fn welcome() -> String {
    "Welcome! I will help you learn foreign words.\n\
     Добро пожаловать! Я помогу учить иностранные слова.\n\n\
     What is your native language? / Какой у вас родной язык?"
        .to_string()
}

pub fn ask_target_lang(locale: Locale) -> String {
    match locale {
        Locale::En => "Which language do you want to learn?".to_string(),
        Locale::Ru => "Какой язык вы хотите изучать?".to_string(),
    }
}

pub fn ask_cefr(locale: Locale) -> String {
    match locale {
        Locale::En => "How would you rate your current level?".to_string(),
        Locale::Ru => "Как вы оцениваете свой текущий уровень?".to_string(),
    }
}

pub fn registered(locale: Locale, target_lang: &str) -> String {
    let lang = lang_display(locale, target_lang);
    match locale {
        Locale::En => format!(
            "You are all set: learning {lang}. Send me a word with /add, \
             or start a lesson with /lesson."
        ),
        Locale::Ru => format!(
            "Готово: изучаем {lang}. Добавьте слово командой /add \
             или начните урок командой /lesson."
        ),
    }
}

pub fn already_registered(locale: Locale) -> String {
    match locale {
        Locale::En => "You are already registered. /lesson starts a lesson, \
                       /add adds a word, /stats shows progress."
            .to_string(),
        Locale::Ru => "Вы уже зарегистрированы. /lesson — начать урок, \
                       /add — добавить слово, /stats — статистика."
            .to_string(),
    }
}

pub fn invalid_language(locale: Locale) -> String {
    match locale {
        Locale::En => "I don't know that language, pick one from the keyboard.".to_string(),
        Locale::Ru => "Я не знаю такого языка, выберите из списка.".to_string(),
    }
}

pub fn same_language(locale: Locale) -> String {
    match locale {
        Locale::En => "The target language must differ from your native one.".to_string(),
        Locale::Ru => "Изучаемый язык должен отличаться от родного.".to_string(),
    }
}

pub fn invalid_cefr(locale: Locale) -> String {
    match locale {
        Locale::En => "Pick a level from A1 to C2.".to_string(),
        Locale::Ru => "Выберите уровень от A1 до C2.".to_string(),
    }
}

pub fn word_added(locale: Locale, word: &str, translations: &[String]) -> String {
    let joined = translations.join(", ");
    match locale {
        Locale::En => format!("Added \"{word}\" — {joined}"),
        Locale::Ru => format!("Добавлено «{word}» — {joined}"),
    }
}

pub fn word_already_known(locale: Locale, word: &str) -> String {
    match locale {
        Locale::En => format!("\"{word}\" is already in your vocabulary."),
        Locale::Ru => format!("«{word}» уже есть в вашем словаре."),
    }
}

pub fn invalid_word(locale: Locale) -> String {
    match locale {
        Locale::En => "Send one word, for example: /add house".to_string(),
        Locale::Ru => "Отправьте одно слово, например: /add house".to_string(),
    }
}

pub fn translation_unavailable(locale: Locale) -> String {
    match locale {
        Locale::En => "Translation is temporarily unavailable, please try again later.".to_string(),
        Locale::Ru => "Перевод временно недоступен, попробуйте позже.".to_string(),
    }
}

pub fn try_again(locale: Locale) -> String {
    match locale {
        Locale::En => "Something went wrong, please try again.".to_string(),
        Locale::Ru => "Что-то пошло не так, попробуйте ещё раз.".to_string(),
    }
}

pub fn lesson_started(locale: Locale, planned: u32) -> String {
    match locale {
        Locale::En => format!("Lesson started: {planned} words. Good luck!"),
        Locale::Ru => format!("Урок начат: слов в уроке — {planned}. Удачи!"),
    }
}

pub fn lesson_resumed(locale: Locale) -> String {
    match locale {
        Locale::En => "Resuming your open lesson.".to_string(),
        Locale::Ru => "Продолжаем незаконченный урок.".to_string(),
    }
}

pub fn lesson_empty(locale: Locale) -> String {
    match locale {
        Locale::En => "Nothing to practice yet — add words with /add first.".to_string(),
        Locale::Ru => "Пока нечего повторять — сначала добавьте слова через /add.".to_string(),
    }
}

pub fn question_prompt(locale: Locale, direction: Direction, prompt: &str) -> String {
    match (locale, direction) {
        (Locale::En, _) => format!("Translate: {prompt}"),
        (Locale::Ru, Direction::ForeignToNative) => format!("Переведите: {prompt}"),
        (Locale::Ru, Direction::NativeToForeign) => format!("Как будет: {prompt}?"),
    }
}

pub fn answer_correct(locale: Locale) -> String {
    match locale {
        Locale::En => "Correct!".to_string(),
        Locale::Ru => "Верно!".to_string(),
    }
}

pub fn answer_typo(locale: Locale, expected: &str) -> String {
    match locale {
        Locale::En => format!("Almost — a small typo. Correct spelling: {expected}"),
        Locale::Ru => format!("Почти — небольшая опечатка. Правильно: {expected}"),
    }
}

pub fn answer_wrong(locale: Locale, expected: &str) -> String {
    match locale {
        Locale::En => format!("Not quite. Expected: {expected}"),
        Locale::Ru => format!("Не совсем. Правильный ответ: {expected}"),
    }
}

pub fn lesson_summary(locale: Locale, summary: &LessonSummary) -> String {
    let minutes = summary.duration_secs / 60;
    let seconds = summary.duration_secs % 60;
    match locale {
        Locale::En => format!(
            "Lesson finished!\nWords: {}\nCorrect: {}\nWrong: {}\nAccuracy: {:.1}%\nTime: {}m {}s",
            summary.planned_count,
            summary.correct,
            summary.incorrect,
            summary.accuracy,
            minutes,
            seconds
        ),
        Locale::Ru => format!(
            "Урок завершён!\nСлов: {}\nВерно: {}\nОшибок: {}\nТочность: {:.1}%\nВремя: {}м {}с",
            summary.planned_count,
            summary.correct,
            summary.incorrect,
            summary.accuracy,
            minutes,
            seconds
        ),
    }
}

pub fn no_active_lesson(locale: Locale) -> String {
    match locale {
        Locale::En => "No lesson in progress — start one with /lesson.".to_string(),
        Locale::Ru => "Сейчас нет урока — начните командой /lesson.".to_string(),
    }
}

pub fn stats(locale: Locale, counts: &VocabularyCounts, due_now: u64) -> String {
    match locale {
        Locale::En => format!(
            "Your vocabulary: {} words\nNew: {}\nLearning: {}\nReviewing: {}\nMastered: {}\nDue for review: {}",
            counts.total(),
            counts.new_count,
            counts.learning,
            counts.reviewing,
            counts.mastered,
            due_now
        ),
        Locale::Ru => format!(
            "Ваш словарь: {} слов\nНовые: {}\nИзучаются: {}\nНа повторении: {}\nОсвоены: {}\nПора повторить: {}",
            counts.total(),
            counts.new_count,
            counts.learning,
            counts.reviewing,
            counts.mastered,
            due_now
        ),
    }
}

pub fn notifications_toggled(locale: Locale, on: bool) -> String {
    match (locale, on) {
        (Locale::En, true) => "Reminders are on.".to_string(),
        (Locale::En, false) => "Reminders are off.".to_string(),
        (Locale::Ru, true) => "Напоминания включены.".to_string(),
        (Locale::Ru, false) => "Напоминания выключены.".to_string(),
    }
}

pub fn language_switched(locale: Locale, target_lang: &str) -> String {
    let lang = lang_display(locale, target_lang);
    match locale {
        Locale::En => format!("Switched to learning {lang}."),
        Locale::Ru => format!("Переключились на изучение: {lang}."),
    }
}

pub fn reminder(locale: Locale) -> String {
    match locale {
        Locale::En => "Time to practice! A short lesson is waiting: /lesson".to_string(),
        Locale::Ru => "Пора позаниматься! Короткий урок ждёт вас: /lesson".to_string(),
    }
}

pub fn unknown_input(locale: Locale) -> String {
    match locale {
        Locale::En => "I didn't get that. /lesson starts a lesson, /add adds a word.".to_string(),
        Locale::Ru => "Не понял. /lesson — начать урок, /add — добавить слово.".to_string(),
    }
}
