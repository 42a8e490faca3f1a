use crate::conversation::ConversationTurn;
use crate::form::{FormField, SongForm};
use crate::session_state::{AgentState, FormPhase};
use crate::song::Song;
use serde::Serialize;

/// Events a session broadcasts to its observers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        from: AgentState,
        to: AgentState,
    },
    Turn(ConversationTurn),
    QuestionAsked(Option<FormField>),
    FieldFilled {
        field: FormField,
        value: String,
    },
    FormCompleted(SongForm),
    SongReady(Song),
    PermissionDenied,
    Reset,
    Error(String),
}

/// Point-in-time view of a session, for diagnostics and tests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: AgentState,
    pub form: SongForm,
    pub target: Option<FormField>,
    pub phase: FormPhase,
    pub conversation: Vec<ConversationTurn>,
    pub pending_speech: usize,
    pub song_delivered: bool,
}
