/// Control phrases recognised in short utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    GoBack,
    Skip,
    Help,
    StartOver,
}

/// Longer utterances are answers that happen to contain a command word.
const MAX_COMMAND_WORDS: usize = 4;

/// Words that may come before a command without changing it ("let's start over").
const LEAD_INS: &[&str] = &[
    "let's", "lets", "please", "ok", "okay", "um", "uh", "just", "can", "we",
];

const START_OVER: &[&str] = &["start over", "new song", "a new song", "start a new song"];

impl VoiceCommand {
    /// Recognises a command that opens a short utterance. Answers that merely
    /// mention a command word ("my new song") are left alone.
    pub fn detect(utterance: &str) -> Option<VoiceCommand> {
        let normalized: String = utterance
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() || words.len() > MAX_COMMAND_WORDS {
            return None;
        }
        let start = words.iter().position(|word| !LEAD_INS.contains(word))?;
        let words = &words[start..];
        let phrase = words.join(" ");

        if START_OVER.contains(&phrase.as_str()) {
            Some(VoiceCommand::StartOver)
        } else if phrase.starts_with("go back")
            || phrase == "previous"
            || phrase == "previous question"
        {
            Some(VoiceCommand::GoBack)
        } else if words[0] == "skip" {
            Some(VoiceCommand::Skip)
        } else if words[0] == "help" {
            Some(VoiceCommand::Help)
        } else {
            None
        }
    }
}

/// A yes/no reply to the review read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    No,
}

const YES_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "correct", "right", "ok", "okay", "perfect",
    "absolutely", "definitely",
];
const NO_WORDS: &[&str] = &["no", "nope", "nah", "not", "wrong", "incorrect", "edit", "change"];

/// Replies this short that only say no are treated as "nothing to add".
const MAX_REFUSAL_WORDS: usize = 3;

impl Confirmation {
    /// A "no" word anywhere wins over a "yes" word ("yes, no wait").
    pub fn detect(utterance: &str) -> Option<Confirmation> {
        let words = words(utterance);
        if words.iter().any(|word| NO_WORDS.contains(&word.as_str())) {
            Some(Confirmation::No)
        } else if words.iter().any(|word| YES_WORDS.contains(&word.as_str())) {
            Some(Confirmation::Yes)
        } else {
            None
        }
    }

    /// Whether a short answer declines to add anything ("no", "nothing", "not really").
    pub fn is_refusal(utterance: &str) -> bool {
        let words = words(utterance);
        if words.is_empty() || words.len() > MAX_REFUSAL_WORDS {
            return false;
        }
        matches!(words[0].as_str(), "nothing" | "none")
            || Confirmation::detect(utterance) == Some(Confirmation::No)
    }
}

fn words(utterance: &str) -> Vec<String> {
    utterance
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}
