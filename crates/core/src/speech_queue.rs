//! Serialized playback of agent speech.
//!
//! The queue never runs a completion itself. Each item carries an optional
//! `on_complete` value which is handed back to the owner through
//! [`SpeechQueue::settle`] once the item's audio has finished; the owner
//! decides what it means and only then asks the queue to start the next item.

use crate::error::SessionError;
use crate::voice_api::{AudioSink, SpeechSynthesizer};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct SpeechQueueItem<T> {
    pub text: String,
    pub pause_before: Duration,
    pub on_complete: Option<T>,
}

/// Identifies one dispatch of one item. Outcomes with a ticket from an older
/// generation belong to items abandoned by [`SpeechQueue::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    sequence: u64,
}

/// Reported by the playback task when an item has finished or failed.
#[derive(Debug)]
pub struct PlaybackDone {
    ticket: Ticket,
    result: Result<()>,
}

#[derive(Debug)]
pub enum Settled<T> {
    Completed(Option<T>),
    Failed(anyhow::Error),
    /// The outcome belonged to an item that was cleared before it finished.
    Stale,
}

struct InFlight<T> {
    ticket: Ticket,
    on_complete: Option<T>,
    task: JoinHandle<()>,
}

pub struct SpeechQueue<T> {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    voice_id: String,
    chunk_chars: usize,
    pending: VecDeque<SpeechQueueItem<T>>,
    in_flight: Option<InFlight<T>>,
    generation: u64,
    next_sequence: u64,
    done_tx: mpsc::UnboundedSender<PlaybackDone>,
    done_rx: mpsc::UnboundedReceiver<PlaybackDone>,
}

impl<T> SpeechQueue<T> {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        voice_id: impl Into<String>,
        chunk_chars: usize,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            synthesizer,
            sink,
            voice_id: voice_id.into(),
            chunk_chars: chunk_chars.max(1),
            pending: VecDeque::new(),
            in_flight: None,
            generation: 0,
            next_sequence: 0,
            done_tx,
            done_rx,
        }
    }

    pub fn enqueue(&mut self, text: impl Into<String>, on_complete: Option<T>) {
        self.enqueue_after(Duration::ZERO, text, on_complete);
    }

    /// Queues `text` to be spoken after waiting `pause` once its turn comes.
    pub fn enqueue_after(&mut self, pause: Duration, text: impl Into<String>, on_complete: Option<T>) {
        let item = SpeechQueueItem {
            text: text.into(),
            pause_before: pause,
            on_complete,
        };
        tracing::debug!(
            "Queued speech ({} chars, {} pending)",
            item.text.chars().count(),
            self.pending.len() + 1
        );
        self.pending.push_back(item);
    }

    /// Starts the next item if nothing is playing. Returns the text that started.
    pub fn pump(&mut self) -> Option<String> {
        if self.in_flight.is_some() {
            return None;
        }
        let item = self.pending.pop_front()?;

        let ticket = Ticket {
            generation: self.generation,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        let chunks = chunk_text(&item.text, self.chunk_chars);
        tracing::debug!("Speaking item {} in {} chunk(s)", ticket.sequence, chunks.len());

        let synthesizer = Arc::clone(&self.synthesizer);
        let sink = Arc::clone(&self.sink);
        let voice_id = self.voice_id.clone();
        let done_tx = self.done_tx.clone();
        let pause = item.pause_before;
        let task = tokio::spawn(async move {
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let result = play_chunks(synthesizer.as_ref(), sink.as_ref(), &voice_id, chunks).await;
            // The receiver lives as long as the queue.
            let _ = done_tx.send(PlaybackDone { ticket, result });
        });

        self.in_flight = Some(InFlight {
            ticket,
            on_complete: item.on_complete,
            task,
        });
        Some(item.text)
    }

    /// Waits for the in-flight item to report back. Pending forever when idle.
    pub async fn next_outcome(&mut self) -> PlaybackDone {
        if self.in_flight.is_none() {
            return std::future::pending().await;
        }
        match self.done_rx.recv().await {
            Some(done) => done,
            None => std::future::pending().await,
        }
    }

    /// Matches an outcome against the in-flight item, freeing the queue for the next one.
    pub fn settle(&mut self, done: PlaybackDone) -> Settled<T> {
        match &self.in_flight {
            Some(in_flight) if in_flight.ticket == done.ticket => {}
            _ => {
                tracing::debug!("Discarding outcome of interrupted item {}", done.ticket.sequence);
                return Settled::Stale;
            }
        }
        let Some(in_flight) = self.in_flight.take() else {
            return Settled::Stale;
        };
        match done.result {
            Ok(()) => Settled::Completed(in_flight.on_complete),
            Err(e) => Settled::Failed(e),
        }
    }

    /// Abandons the in-flight item and everything pending, and silences the sink.
    pub async fn clear(&mut self) {
        self.generation += 1;
        let dropped = self.pending.len();
        self.pending.clear();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
            tracing::debug!("Interrupted item {}", in_flight.ticket.sequence);
        }
        if dropped > 0 {
            tracing::debug!("Dropped {} queued item(s)", dropped);
        }
        self.sink.stop().await;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Items not yet finished, including the one playing.
    pub fn outstanding(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }
}

impl<T> Drop for SpeechQueue<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
    }
}

async fn play_chunks(
    synthesizer: &dyn SpeechSynthesizer,
    sink: &dyn AudioSink,
    voice_id: &str,
    chunks: Vec<String>,
) -> Result<()> {
    for chunk in chunks.iter().filter(|chunk| !chunk.trim().is_empty()) {
        let audio = synthesizer
            .synthesize(chunk, voice_id)
            .await
            .map_err(|e| SessionError::Synthesis(format!("{e:#}")))?;
        sink.play(audio)
            .await
            .map_err(|e| SessionError::Playback(format!("{e:#}")))?;
    }
    Ok(())
}

/// Splits `text` into pieces of at most `max_chars` characters.
///
/// Whole lines are packed together where they fit; a line longer than the
/// bound is cut at the last space inside it, or hard at the bound when it has
/// no space.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len > 0 && current_len + line_len + 1 > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let mut rest = line;
            while !rest.is_empty() {
                let (head, tail) = split_line(rest, max_chars);
                chunks.push(head.to_string());
                rest = tail.trim();
            }
        } else {
            if current_len > 0 {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

fn split_line(line: &str, max_chars: usize) -> (&str, &str) {
    let Some((bound, _)) = line.char_indices().nth(max_chars) else {
        return (line, "");
    };
    match line[..bound].rfind(' ') {
        Some(space) if space > 0 => line.split_at(space),
        _ => line.split_at(bound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoSynthesizer, RecordingSink};

    fn queue(
        synthesizer: Arc<EchoSynthesizer>,
        sink: Arc<RecordingSink>,
        chunk_chars: usize,
    ) -> SpeechQueue<&'static str> {
        SpeechQueue::new(synthesizer, sink, "voice", chunk_chars)
    }

    /// Drives the queue the way the session does until it is empty.
    async fn drain(queue: &mut SpeechQueue<&'static str>) -> Vec<Settled<&'static str>> {
        let mut settled = Vec::new();
        queue.pump();
        while queue.outstanding() > 0 {
            let done = queue.next_outcome().await;
            settled.push(queue.settle(done));
            queue.pump();
        }
        settled
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello there", 1000), vec!["hello there"]);
        assert_eq!(chunk_text("", 10), vec![""]);
    }

    #[test]
    fn packs_lines_up_to_the_bound() {
        let chunks = chunk_text("first line here\nsecond line here\nthird", 20);
        assert_eq!(chunks, vec!["first line here", "second line here", "third"]);

        let chunks = chunk_text("one\ntwo\nthree four five six", 12);
        assert_eq!(chunks, vec!["one\ntwo", "three four", "five six"]);
    }

    #[test]
    fn long_lines_split_at_spaces() {
        let chunks = chunk_text("the quick brown fox jumps over", 10);
        assert_eq!(chunks, vec!["the quick", "brown fox", "jumps over"]);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn words_longer_than_the_bound_are_cut() {
        assert_eq!(chunk_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn bound_counts_characters_not_bytes() {
        let chunks = chunk_text("ééééé ééééé", 5);
        assert_eq!(chunks, vec!["ééééé", "ééééé"]);
    }

    #[tokio::test]
    async fn plays_in_enqueue_order_with_interleaved_enqueues() {
        let synthesizer = Arc::new(EchoSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let mut queue = queue(synthesizer, sink.clone(), 1000);

        queue.enqueue("A", Some("a"));
        queue.pump();
        queue.enqueue("B", Some("b"));

        let done = queue.next_outcome().await;
        assert!(matches!(queue.settle(done), Settled::Completed(Some("a"))));
        // Enqueued while A's completion is being handled.
        queue.enqueue("C", Some("c"));
        queue.pump();

        let settled = drain(&mut queue).await;
        let completions: Vec<_> = settled
            .into_iter()
            .map(|s| match s {
                Settled::Completed(value) => value,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(completions, vec![Some("b"), Some("c")]);
        assert_eq!(sink.played(), vec!["A", "B", "C"]);
        assert_eq!(queue.outstanding(), 0);
    }

    #[tokio::test]
    async fn long_item_completes_once_after_its_last_chunk() {
        let synthesizer = Arc::new(EchoSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let mut queue = queue(synthesizer.clone(), sink.clone(), 20);

        queue.enqueue("first line here\nsecond line here\nthird", Some("done"));
        queue.enqueue("next", None);

        queue.pump();
        let done = queue.next_outcome().await;
        assert!(matches!(queue.settle(done), Settled::Completed(Some("done"))));
        // The next item has not been synthesized yet.
        assert_eq!(
            synthesizer.requests(),
            vec!["first line here", "second line here", "third"]
        );
        assert_eq!(sink.played().len(), 3);

        drain(&mut queue).await;
        assert_eq!(sink.played().last().map(String::as_str), Some("next"));
    }

    #[tokio::test]
    async fn failed_synthesis_reports_failure() {
        let synthesizer = Arc::new(EchoSynthesizer::failing_on("boom"));
        let sink = Arc::new(RecordingSink::default());
        let mut queue = queue(synthesizer, sink.clone(), 1000);

        queue.enqueue("boom goes the line", Some("x"));
        let settled = drain(&mut queue).await;

        match &settled[..] {
            [Settled::Failed(e)] => {
                assert!(matches!(
                    e.downcast_ref::<SessionError>(),
                    Some(SessionError::Synthesis(_))
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(sink.played().is_empty());
    }

    #[tokio::test]
    async fn clear_discards_the_interrupted_outcome() {
        let synthesizer = Arc::new(EchoSynthesizer::default());
        let sink = Arc::new(RecordingSink::holding());
        let mut queue = queue(synthesizer, sink.clone(), 1000);

        queue.enqueue("interrupted", Some("stale"));
        queue.enqueue("dropped", Some("never"));
        queue.pump();
        tokio::task::yield_now().await;

        queue.clear().await;
        assert_eq!(queue.outstanding(), 0);
        assert_eq!(sink.stops(), 1);

        // An outcome from before the clear can't complete anything.
        let stale = PlaybackDone {
            ticket: Ticket {
                generation: 0,
                sequence: 0,
            },
            result: Ok(()),
        };
        assert!(matches!(queue.settle(stale), Settled::Stale));

        queue.enqueue("fresh", Some("fresh"));
        queue.pump();
        sink.release();
        let done = queue.next_outcome().await;
        assert!(matches!(queue.settle(done), Settled::Completed(Some("fresh"))));
        assert_eq!(sink.played(), vec!["fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_pause_before_an_item() {
        let synthesizer = Arc::new(EchoSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let mut queue = queue(synthesizer, sink.clone(), 1000);

        queue.enqueue_after(Duration::from_millis(500), "later", None);
        let started = tokio::time::Instant::now();
        drain(&mut queue).await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(sink.played(), vec!["later"]);
    }
}
