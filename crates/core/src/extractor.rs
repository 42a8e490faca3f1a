//! Keyword and pattern based field extraction.
//!
//! Everything here is pure: the same utterance and target always produce the
//! same [`ExtractedFields`], and nothing fails. When a value cannot be found the
//! slot is simply left out and the session decides what to do about it.

use crate::form::FormField;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Styles recognised in an answer, scanned in this order.
const MUSIC_STYLES: [&str; 18] = [
    "pop",
    "rock",
    "jazz",
    "country",
    "rap",
    "hip hop",
    "classical",
    "lullaby",
    "electronic",
    "dance",
    "reggae",
    "blues",
    "folk",
    "indie",
    "metal",
    "r&b",
    "disco",
    "techno",
];

const EMOTION_KEYWORDS: [(&str, [&str; 4]); 7] = [
    ("happy", ["happy", "joyful", "cheerful", "upbeat"]),
    ("calm", ["calm", "peaceful", "relaxing", "soothing"]),
    ("energetic", ["energetic", "exciting", "thrilling", "pumped"]),
    ("sad", ["sad", "emotional", "touching", "heartfelt"]),
    ("funny", ["funny", "hilarious", "comedy", "silly"]),
    ("romantic", ["romantic", "love", "sweet", "passionate"]),
    ("cool", ["cool", "chill", "smooth", "groovy"]),
];

/// Capitalised words that open a sentence far more often than they name someone.
const FILLER_WORDS: [&str; 36] = [
    "hi", "hey", "hello", "yo", "my", "me", "name", "names", "it", "its", "it's", "the", "this",
    "that", "yes", "yeah", "yep", "no", "nope", "okay", "ok", "um", "uh", "well", "so", "oh",
    "sure", "call", "please", "thanks", "let", "let's", "i'm", "im", "is", "and",
];

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("capitalized word pattern"));

static NAME_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:name is|call me|named after|named|about)\s+(\w+)")
        .expect("name phrase pattern")
});

static STORY_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\w+)'s story").expect("story pattern"));

/// Partial record produced from one utterance. `None` means "nothing found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub character_name: Option<String>,
    pub music_style: Option<String>,
    pub emotion: Option<String>,
    pub topic: Option<String>,
    pub additional_details: Option<String>,
}

impl ExtractedFields {
    pub fn get(&self, field: FormField) -> Option<&str> {
        let slot = match field {
            FormField::CharacterName => &self.character_name,
            FormField::MusicStyle => &self.music_style,
            FormField::Emotion => &self.emotion,
            FormField::Topic => &self.topic,
            FormField::AdditionalDetails => &self.additional_details,
        };
        slot.as_deref()
    }

    /// Extracted values in field priority order.
    pub fn iter(&self) -> impl Iterator<Item = (FormField, &str)> + '_ {
        FormField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|value| (field, value)))
    }
}

/// Extracts whatever field values `utterance` carries, given the field being asked for.
pub fn extract(utterance: &str, target: Option<FormField>) -> ExtractedFields {
    let mut extracted = ExtractedFields {
        additional_details: Some(utterance.to_string()),
        ..Default::default()
    };

    if utterance.trim().is_empty() {
        return extracted;
    }

    extracted.character_name = if target == Some(FormField::CharacterName) {
        character_name(utterance)
    } else {
        mentioned_name(utterance)
    };

    if target == Some(FormField::MusicStyle) {
        extracted.music_style = music_style(utterance);
    }

    extracted.emotion = if target == Some(FormField::Emotion) {
        Some(
            first_word(utterance)
                .map(|word| strip_trailing_punctuation(&word.to_lowercase()).to_string())
                .filter(|word| !word.is_empty())
                .unwrap_or_else(|| "happy".to_string()),
        )
    } else {
        emotion_keyword(utterance).map(str::to_string)
    };

    if target == Some(FormField::Topic) {
        extracted.topic = Some(topic(utterance));
    }

    extracted
}

/// Resolves a name from an answer to "who is this track for?".
fn character_name(utterance: &str) -> Option<String> {
    let trimmed = utterance.trim();

    if let Some(name) = CAPITALIZED_WORD
        .find_iter(trimmed)
        .map(|m| m.as_str())
        .find(|word| !is_filler(word))
    {
        return Some(name.to_string());
    }

    let candidates: Vec<&str> = trimmed
        .split_whitespace()
        .filter(|word| word.chars().count() >= 2)
        .collect();
    let token = candidates
        .iter()
        .find(|word| !is_filler(word))
        .or_else(|| candidates.first());
    if let Some(token) = token {
        let name = title_case(token);
        let name = strip_trailing_punctuation(&name);
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    first_word(trimmed).map(capitalize_first)
}

/// Picks up a name mentioned in passing ("my name is sam", "it's Leo's story").
fn mentioned_name(utterance: &str) -> Option<String> {
    NAME_PHRASE
        .captures(utterance)
        .or_else(|| STORY_OF.captures(utterance))
        .and_then(|caps| caps.get(1))
        .map(|m| capitalize_first(m.as_str()))
}

fn music_style(utterance: &str) -> Option<String> {
    let lowered = utterance.to_lowercase();
    if let Some(style) = MUSIC_STYLES.iter().find(|style| lowered.contains(*style)) {
        return Some(canonical_style(style).to_string());
    }
    first_word(utterance)
        .map(|word| strip_trailing_punctuation(&word.to_lowercase()).to_string())
        .filter(|word| !word.is_empty())
}

fn canonical_style(style: &'static str) -> &'static str {
    match style {
        "hip hop" => "rap",
        "dance" | "techno" => "electronic",
        "r&b" => "soul",
        other => other,
    }
}

fn emotion_keyword(utterance: &str) -> Option<&'static str> {
    let lowered = utterance.to_lowercase();
    EMOTION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(emotion, _)| *emotion)
}

fn topic(utterance: &str) -> String {
    let words: Vec<&str> = utterance.split_whitespace().collect();
    if words.len() > 3 {
        words[..3].join(" ")
    } else {
        utterance.trim().to_string()
    }
}

fn first_word(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

fn is_filler(word: &str) -> bool {
    let lowered = strip_trailing_punctuation(&word.to_lowercase()).to_string();
    FILLER_WORDS.contains(&lowered.as_str())
}

fn strip_trailing_punctuation(word: &str) -> &str {
    word.trim_end_matches([',', '.', '!', '?', ';', ':'])
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let rest = chars.as_str().to_lowercase();
            first.to_uppercase().chain(rest.chars()).collect()
        }
        None => String::new(),
    }
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every style a vocabulary match can resolve to.
    const CANONICAL_STYLES: [&str; 15] = [
        "pop",
        "rock",
        "jazz",
        "country",
        "rap",
        "classical",
        "lullaby",
        "electronic",
        "reggae",
        "blues",
        "folk",
        "indie",
        "metal",
        "soul",
        "disco",
    ];

    #[test]
    fn greeting_does_not_shadow_the_name() {
        let fields = extract("Hi I'm Jordan", Some(FormField::CharacterName));
        assert_eq!(fields.character_name.as_deref(), Some("Jordan"));
    }

    #[test]
    fn capitalized_word_wins_without_punctuation() {
        let cases = [
            ("It's for Priya!", "Priya"),
            ("Marcus, please", "Marcus"),
            ("make it for my friend Sam.", "Sam"),
            ("Leo", "Leo"),
        ];
        for (utterance, expected) in cases {
            let fields = extract(utterance, Some(FormField::CharacterName));
            assert_eq!(fields.character_name.as_deref(), Some(expected), "{utterance}");
        }
    }

    #[test]
    fn lowercase_names_are_title_cased() {
        let fields = extract("hi it's jordan!", Some(FormField::CharacterName));
        assert_eq!(fields.character_name.as_deref(), Some("Jordan"));

        let fields = extract("a b", Some(FormField::CharacterName));
        assert_eq!(fields.character_name.as_deref(), Some("A"));
    }

    #[test]
    fn hip_hop_canonicalizes_to_rap() {
        let fields = extract("let's do some chill hip hop", Some(FormField::MusicStyle));
        assert_eq!(fields.music_style.as_deref(), Some("rap"));
    }

    #[test]
    fn matched_styles_are_always_canonical() {
        let utterances = [
            "something you can dance to",
            "hard techno please",
            "smooth r&b",
            "hip hop and rock",
            "Classical music",
            "some indie folk",
            "disco!",
            "a lullaby",
        ];
        for utterance in utterances {
            let style = extract(utterance, Some(FormField::MusicStyle))
                .music_style
                .unwrap();
            assert!(CANONICAL_STYLES.contains(&style.as_str()), "{utterance} -> {style}");
        }
    }

    #[test]
    fn vocabulary_order_beats_utterance_order() {
        let fields = extract("jazz or maybe pop", Some(FormField::MusicStyle));
        assert_eq!(fields.music_style.as_deref(), Some("pop"));
    }

    #[test]
    fn unknown_style_falls_back_to_first_word() {
        let fields = extract("Polka, definitely", Some(FormField::MusicStyle));
        assert_eq!(fields.music_style.as_deref(), Some("polka"));
    }

    #[test]
    fn asked_emotion_takes_the_first_word() {
        let fields = extract("Upbeat and bouncy", Some(FormField::Emotion));
        assert_eq!(fields.emotion.as_deref(), Some("upbeat"));
    }

    #[test]
    fn unasked_emotion_uses_keyword_table_order() {
        let fields = extract("a sweet and chill tune", None);
        assert_eq!(fields.emotion.as_deref(), Some("romantic"));

        let fields = extract("just something to sing along to", None);
        assert_eq!(fields.emotion, None);
    }

    #[test]
    fn topic_keeps_at_most_three_words() {
        let fields = extract("a dog who surfs big waves", Some(FormField::Topic));
        assert_eq!(fields.topic.as_deref(), Some("a dog who"));

        let fields = extract("  summer road trips ", Some(FormField::Topic));
        assert_eq!(fields.topic.as_deref(), Some("summer road trips"));
    }

    #[test]
    fn details_are_always_the_raw_utterance() {
        let fields = extract("  Keep it short ", Some(FormField::Topic));
        assert_eq!(fields.additional_details.as_deref(), Some("  Keep it short "));
    }

    #[test]
    fn blank_utterance_only_records_details() {
        for target in FormField::ALL.map(Some).into_iter().chain([None]) {
            let fields = extract("   ", target);
            assert_eq!(
                fields,
                ExtractedFields {
                    additional_details: Some("   ".to_string()),
                    ..Default::default()
                }
            );
        }
        let fields = extract("", Some(FormField::Emotion));
        assert_eq!(fields.additional_details.as_deref(), Some(""));
        assert_eq!(fields.iter().count(), 1);
    }

    #[test]
    fn names_mentioned_in_passing() {
        let fields = extract("my name is sam", Some(FormField::Topic));
        assert_eq!(fields.character_name.as_deref(), Some("Sam"));

        let fields = extract("it's Leo's story", None);
        assert_eq!(fields.character_name.as_deref(), Some("Leo"));
    }

    #[test]
    fn style_and_topic_need_to_be_asked_for() {
        let fields = extract("rock music about the ocean", None);
        assert_eq!(fields.music_style, None);
        assert_eq!(fields.topic, None);
    }
}
