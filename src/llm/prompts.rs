//! Prompt templates for the two model operations. The response contract is
//! strict JSON; the gateway rejects anything that does not parse into the
//! expected shape.

pub const TRANSLATE_SYSTEM: &str = "You are a bilingual dictionary service. \
Respond with a single JSON object and nothing else. Schema: \
{\"translations\": [string, ...], \"examples\": [{\"src\": string, \"tgt\": string}, ...], \
\"forms\": {string: string, ...}}. Order translations from most to least common. \
Give at most five translations, two examples and the basic grammatical forms.";

pub const VALIDATE_SYSTEM: &str = "You grade vocabulary-quiz answers. \
Respond with a single JSON object and nothing else. Schema: \
{\"correct\": boolean, \"comment\": string}. Accept synonyms and valid \
alternative translations; reject answers with a different meaning. The \
comment is one short sentence of feedback for the learner.";

/// English display name for the feedback-comment language instruction.
/// Unknown codes are passed through verbatim.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "ru" => "Russian",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "zh" => "Chinese",
        other => other,
    }
}

pub fn translate_user_prompt(text: &str, src_lang: &str, tgt_lang: &str) -> String {
    format!(
        "Translate the word \"{text}\" from {src_lang} to {tgt_lang}. \
         Include example sentences ({src_lang} source, {tgt_lang} target) and word forms."
    )
}

pub fn validate_user_prompt(
    question: &str,
    expected: &str,
    user_answer: &str,
    src_lang: &str,
    tgt_lang: &str,
    comment_lang: &str,
) -> String {
    format!(
        "The learner was asked to translate \"{question}\" from {src_lang} to {tgt_lang}. \
         The dictionary answer is \"{expected}\". The learner answered \"{user_answer}\". \
         Is the learner's answer an acceptable translation? Write the comment in {comment_lang}."
    )
}
