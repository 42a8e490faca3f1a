use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Append-only record of everything said in the current song session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> ConversationTurn {
        let turn = ConversationTurn {
            speaker,
            text: text.into(),
        };
        self.turns.push(turn.clone());
        turn
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_turns_in_order() {
        let mut log = ConversationLog::default();
        log.push(Speaker::Agent, "Who is this track for?");
        log.push(Speaker::User, "Sam");
        log.push(Speaker::Agent, "Sam. Got it.");

        let turns: Vec<(Speaker, &str)> = log
            .turns()
            .iter()
            .map(|turn| (turn.speaker, turn.text.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Speaker::Agent, "Who is this track for?"),
                (Speaker::User, "Sam"),
                (Speaker::Agent, "Sam. Got it."),
            ]
        );

        log.clear();
        assert!(log.turns().is_empty());
    }
}
