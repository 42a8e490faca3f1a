use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named slot in the song request being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormField {
    CharacterName,
    MusicStyle,
    Emotion,
    Topic,
    AdditionalDetails,
}

impl FormField {
    /// Every field, in the order questions are asked.
    pub const ALL: [FormField; 5] = [
        FormField::CharacterName,
        FormField::MusicStyle,
        FormField::Emotion,
        FormField::Topic,
        FormField::AdditionalDetails,
    ];

    /// The fields a song cannot be composed without, unless configured otherwise.
    pub const REQUIRED: [FormField; 4] = [
        FormField::CharacterName,
        FormField::MusicStyle,
        FormField::Emotion,
        FormField::Topic,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            FormField::CharacterName => "characterName",
            FormField::MusicStyle => "musicStyle",
            FormField::Emotion => "emotion",
            FormField::Topic => "topic",
            FormField::AdditionalDetails => "additionalDetails",
        }
    }

    /// Spoken name of the field.
    pub fn label(&self) -> &'static str {
        match self {
            FormField::CharacterName => "the name",
            FormField::MusicStyle => "the music style",
            FormField::Emotion => "the vibe",
            FormField::Topic => "the topic",
            FormField::AdditionalDetails => "the extra details",
        }
    }

    pub fn default_value(&self) -> Option<&'static str> {
        match self {
            FormField::Emotion => Some("happy"),
            _ => None,
        }
    }

    /// Value used when the field cannot be collected (re-prompt cap, skipped, not required).
    pub fn fallback_value(&self) -> &'static str {
        match self {
            FormField::CharacterName => "Friend",
            FormField::MusicStyle => "rock",
            FormField::Emotion => self.default_value().unwrap_or("happy"),
            FormField::Topic => "life",
            FormField::AdditionalDetails => "",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for FormField {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        FormField::ALL
            .into_iter()
            .find(|field| field.id().to_lowercase() == wanted)
            .ok_or_else(|| SessionError::UnknownField(s.trim().to_string()))
    }
}

/// The structured song request. Every slot starts empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongForm {
    pub character_name: String,
    pub music_style: String,
    pub emotion: String,
    pub topic: String,
    pub additional_details: String,
}

impl SongForm {
    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::CharacterName => &self.character_name,
            FormField::MusicStyle => &self.music_style,
            FormField::Emotion => &self.emotion,
            FormField::Topic => &self.topic,
            FormField::AdditionalDetails => &self.additional_details,
        }
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::CharacterName => &mut self.character_name,
            FormField::MusicStyle => &mut self.music_style,
            FormField::Emotion => &mut self.emotion,
            FormField::Topic => &mut self.topic,
            FormField::AdditionalDetails => &mut self.additional_details,
        };
        *slot = value.into();
    }

    pub fn is_filled(&self, field: FormField) -> bool {
        !self.get(field).is_empty()
    }

    pub fn reset(&mut self) {
        *self = SongForm::default();
    }

    /// A copy with every empty slot (except the free-form details) filled from its fallback.
    pub fn with_fallbacks(&self) -> SongForm {
        let mut filled = self.clone();
        for field in FormField::ALL {
            if !filled.is_filled(field) {
                filled.set(field, field.fallback_value());
            }
        }
        filled
    }
}

/// The question the agent asks to fill `field`, or the closing line once nothing is left.
pub fn question_for(field: Option<FormField>, form: &SongForm) -> String {
    match field {
        Some(FormField::CharacterName) => "Who is this track for? Give me a name.".to_string(),
        Some(FormField::MusicStyle) => {
            let owner = if form.character_name.is_empty() {
                "your".to_string()
            } else {
                format!("{}'s", form.character_name)
            };
            format!(
                "Cool. What style of music are you into for {owner} track? Hip-hop, rock, electronic, or something else?"
            )
        }
        Some(FormField::Emotion) => {
            let style = if form.music_style.is_empty() {
                "track".to_string()
            } else {
                format!("{} track", form.music_style)
            };
            format!("Nice choice. Should the {style} be upbeat, chill, intense, or have another vibe?")
        }
        Some(FormField::Topic) => {
            "Got it. What should the track be about? Any specific theme or subject matter?"
                .to_string()
        }
        Some(FormField::AdditionalDetails) => {
            "Anything else you want to include in the track?".to_string()
        }
        None => {
            "Perfect. I've got everything I need to create your custom track. Ready to hear it?"
                .to_string()
        }
    }
}

/// Reads the answers for `fields` back and asks the user to confirm them.
pub fn review_for(form: &SongForm, fields: &[FormField]) -> String {
    let mut text = "Great! Let's review what you've entered.".to_string();
    for field in fields {
        let value = form.get(*field).trim();
        if value.is_empty() {
            continue;
        }
        let label = field.label();
        let mut chars = label.chars();
        let heading: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        text.push_str(&format!(" {heading}: {value}."));
    }
    text.push_str(" Does that sound right? Say yes to create your track, or no to edit.");
    text
}

/// Short acknowledgement echoing the value that was just recorded.
pub fn confirmation_for(field: FormField, value: &str) -> String {
    match field {
        FormField::CharacterName => format!("{value}. Got it."),
        FormField::MusicStyle => format!("{value}. Solid choice."),
        FormField::Emotion => format!("{value}. That works well."),
        _ => "Got it.".to_string(),
    }
}
