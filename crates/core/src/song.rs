//! Lyric sheet rendering and section splitting.

use crate::form::SongForm;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongSection {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Song {
    pub title: String,
    pub lyrics: String,
    pub sections: Vec<SongSection>,
}

/// Renders a song from a completed form. Empty slots take their fallback values.
pub fn compose(form: &SongForm) -> Song {
    let form = form.with_fallbacks();
    let name = &form.character_name;
    let style = &form.music_style;
    let emotion = &form.emotion;
    let topic = &form.topic;

    let title = format!("{name}'s {} {topic} Song", capitalize(style));
    let mut lyrics = format!(
        "{title}\n\n\
         [Intro]\n\
         Here's a {emotion} {style} track, made for {name}\n\n\
         [Verse 1]\n\
         {name} wakes up with {topic} on their mind\n\
         A {emotion} feeling, the {style} kind\n\
         Every step they take, the beat keeps time\n\
         Turning every moment into rhyme\n\n\
         [Chorus]\n\
         Oh {name}, this one's for you\n\
         A {style} song about {topic} too\n\
         Feel it loud, let the {emotion} through\n\
         Oh {name}, this one's for you\n\n\
         [Verse 2]\n\
         When the day gets long and the road gets wide\n\
         {name} keeps {topic} right by their side\n\
         With a {emotion} heart and a {style} stride\n\
         Nothing in the world they can't ride\n\n\
         [Bridge]\n\
         Turn it up, turn it up, let the whole world hear\n\
         {name}'s {topic}, loud and clear\n\n\
         [Final Chorus]\n\
         Oh {name}, this one's for you\n\
         A {style} song about {topic} too\n\
         Feel it loud, let the {emotion} through\n\
         Oh {name}, this one's for you\n\n\
         [Outro]\n\
         That's the track for {name}, {emotion} and {style}, forever new"
    );
    if !form.additional_details.trim().is_empty() {
        lyrics.push_str(&format!(
            "\n(Dedicated with: {})",
            form.additional_details.trim()
        ));
    }

    let sections = split_sections(&lyrics);
    Song {
        title,
        lyrics,
        sections,
    }
}

/// Splits lyrics on `[Label]` marker lines. Text before the first marker is the
/// "Title" section; sections with no text are dropped.
pub fn split_sections(lyrics: &str) -> Vec<SongSection> {
    let mut sections = Vec::new();
    let mut label = "Title".to_string();
    let mut body: Vec<&str> = Vec::new();

    for line in lyrics.lines() {
        let trimmed = line.trim();
        if let Some(marker) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            push_section(&mut sections, &label, &body);
            label = marker.trim().to_string();
            body.clear();
        } else {
            body.push(line);
        }
    }
    push_section(&mut sections, &label, &body);
    sections
}

fn push_section(sections: &mut Vec<SongSection>, label: &str, body: &[&str]) {
    let text = body.join("\n").trim().to_string();
    if !text.is_empty() {
        sections.push(SongSection {
            label: label.to_string(),
            text,
        });
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
