use crate::form::FormField;
use crate::voice_api::ListenOptions;
use std::time::Duration;

pub const DEFAULT_WELCOME: &str =
    "Hey there! I'm TuneGram. I'll create an awesome personalized track for you.";

/// Tunables for one [`ConversationSession`](crate::session_state::ConversationSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub voice_id: String,
    /// Quiet period after the last transcript change that ends an utterance.
    pub silence_timeout: Duration,
    /// Upper bound, in characters, of one synthesis request.
    pub chunk_chars: usize,
    /// Gap between song sections during delivery.
    pub section_pause: Duration,
    pub max_reprompts: u32,
    pub required_fields: Vec<FormField>,
    /// Asked after the required fields; "skip" moves past them.
    pub optional_fields: Vec<FormField>,
    /// Read the answers back and wait for a yes before composing.
    pub review_before_compose: bool,
    pub listen_options: ListenOptions,
    pub welcome_message: String,
    /// Fill empty required fields from values found outside the asked question.
    pub fill_untargeted: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            voice_id: "a0e99841-438c-4a64-b679-ae501e7d6091".to_string(),
            silence_timeout: Duration::from_millis(1500),
            chunk_chars: 1000,
            section_pause: Duration::from_millis(500),
            max_reprompts: 2,
            required_fields: FormField::REQUIRED.to_vec(),
            optional_fields: vec![FormField::AdditionalDetails],
            review_before_compose: true,
            listen_options: ListenOptions::default(),
            welcome_message: DEFAULT_WELCOME.to_string(),
            fill_untargeted: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn with_section_pause(mut self, pause: Duration) -> Self {
        self.section_pause = pause;
        self
    }

    pub fn with_max_reprompts(mut self, max_reprompts: u32) -> Self {
        self.max_reprompts = max_reprompts;
        self
    }

    /// Required fields are kept in priority order with duplicates removed.
    /// `additionalDetails` is always optional.
    pub fn with_required_fields(mut self, fields: impl IntoIterator<Item = FormField>) -> Self {
        let wanted: Vec<FormField> = fields.into_iter().collect();
        self.required_fields = FormField::ALL
            .into_iter()
            .filter(|field| *field != FormField::AdditionalDetails && wanted.contains(field))
            .collect();
        self
    }

    /// Optional fields are kept in priority order with duplicates removed.
    pub fn with_optional_fields(mut self, fields: impl IntoIterator<Item = FormField>) -> Self {
        let wanted: Vec<FormField> = fields.into_iter().collect();
        self.optional_fields = FormField::ALL
            .into_iter()
            .filter(|field| wanted.contains(field))
            .collect();
        self
    }

    pub fn with_review_before_compose(mut self, enabled: bool) -> Self {
        self.review_before_compose = enabled;
        self
    }

    pub fn is_required(&self, field: FormField) -> bool {
        self.required_fields.contains(&field)
    }

    /// Every field the agent asks about: required ones first, then the optional
    /// ones that aren't also required.
    pub fn asked_fields(&self) -> Vec<FormField> {
        let optional = self
            .optional_fields
            .iter()
            .copied()
            .filter(|field| !self.is_required(*field));
        self.required_fields.iter().copied().chain(optional).collect()
    }

    pub fn with_listen_options(mut self, options: ListenOptions) -> Self {
        self.listen_options = options;
        self
    }

    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }

    pub fn with_fill_untargeted(mut self, enabled: bool) -> Self {
        self.fill_untargeted = enabled;
        self
    }
}
