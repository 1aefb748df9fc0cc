/// Parsed user intent. Slash commands are explicit; everything else is
/// resolved by the dispatcher against the current context (registration
/// dialog, open lesson question, or a plain word to add).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    AddWord(String),
    StartLesson,
    ShowStats,
    ToggleNotifications,
    SwitchLanguage(String),
    /// Non-command input, interpreted in context.
    Text(String),
}

pub fn parse_message(raw: &str) -> Command {
    let trimmed = raw.trim();
    if !trimmed.starts_with('/') {
        return Command::Text(trimmed.to_string());
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    match head {
        "/start" => Command::Start,
        "/add" => Command::AddWord(rest.to_string()),
        "/lesson" => Command::StartLesson,
        "/stats" => Command::ShowStats,
        "/notify" => Command::ToggleNotifications,
        "/language" => Command::SwitchLanguage(rest.to_string()),
        _ => Command::Text(trimmed.to_string()),
    }
}

/// A lesson-choice payload is either a bare option index or the option text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoicePayload {
    Index(usize),
    Value(String),
}

pub fn parse_choice(payload: &str) -> ChoicePayload {
    let trimmed = payload.trim();
    match trimmed.parse::<usize>() {
        Ok(index) => ChoicePayload::Index(index),
        Err(_) => ChoicePayload::Value(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_message("/start"), Command::Start);
        assert_eq!(parse_message("/lesson"), Command::StartLesson);
        assert_eq!(parse_message("/stats "), Command::ShowStats);
        assert_eq!(parse_message("/notify"), Command::ToggleNotifications);
        assert_eq!(
            parse_message("/add  house"),
            Command::AddWord("house".to_string())
        );
        assert_eq!(
            parse_message("/language de"),
            Command::SwitchLanguage("de".to_string())
        );
    }

    #[test]
    fn unknown_slash_falls_back_to_text() {
        assert_eq!(
            parse_message("/frobnicate"),
            Command::Text("/frobnicate".to_string())
        );
    }

    #[test]
    fn plain_text_is_contextual() {
        assert_eq!(parse_message("  дом  "), Command::Text("дом".to_string()));
    }

    #[test]
    fn choice_payload_index_or_value() {
        assert_eq!(parse_choice("2"), ChoicePayload::Index(2));
        assert_eq!(parse_choice("дом"), ChoicePayload::Value("дом".to_string()));
    }
}
