use crate::{
    Input,
    commands::{Confirmation, VoiceCommand},
    config::SessionConfig,
    conversation::{ConversationLog, Speaker},
    error::SessionError,
    extractor::extract,
    form::{FormField, SongForm, confirmation_for, question_for, review_for},
    generic_types::{SessionEvent, SessionSnapshot},
    silence::SilenceDetector,
    song::compose,
    speech_queue::{PlaybackDone, Settled, SpeechQueue},
    voice_api::{AudioSink, Permission, PermissionGate, SpeechSynthesizer, TranscriptSource},
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

const INPUT_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 512;

const NEW_TRACK: &str = "Let's make a new track.";
const ANOTHER_SONG: &str =
    "Would you like to create another song? Just tell me a new character name or theme.";
const REVIEW_REPROMPT: &str =
    "Sorry, I didn't catch that. Say yes to create your track, or no to edit.";
const REVIEW_HELP: &str = "Say yes and I'll create your track, or no to change your answers. \
You can also say \"go back\" to change the last one.";
const REVIEW_FALLBACK: &str = "No worries, I'll go with what we have.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Uninitialized,
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentState::Uninitialized => "uninitialized",
            AgentState::Idle => "idle",
            AgentState::Listening => "listening",
            AgentState::Processing => "processing",
            AgentState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Where the current song request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormPhase {
    /// Asking for fields.
    Filling,
    /// Waiting for a yes/no on the read-back.
    Reviewing,
    /// The song has been composed. Nothing more goes into this form.
    Completed,
}

/// What to do once a queued utterance has been spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    /// Open the microphone for the answer.
    Listen,
    /// The last section of a song has played.
    SongDelivered,
}

/// The external services a session talks to.
pub struct VoiceServices {
    pub transcript: Arc<dyn TranscriptSource>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub sink: Arc<dyn AudioSink>,
    pub permission: Arc<dyn PermissionGate>,
}

/// Cloneable front door to a running [`ConversationSession`].
#[derive(Clone)]
pub struct SessionHandle {
    input_tx: mpsc::Sender<Input>,
    state_rx: watch::Receiver<AgentState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub async fn send(&self, input: Input) -> Result<(), SessionError> {
        self.input_tx
            .send(input)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.send(Input::Start).await
    }

    pub async fn toggle_capture(&self) -> Result<(), SessionError> {
        self.send(Input::ToggleCapture).await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.send(Input::Stop).await
    }

    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Input::SubmitText(text.into())).await
    }

    pub async fn new_song(&self) -> Result<(), SessionError> {
        self.send(Input::NewSong).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Input::Shutdown).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Input::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn state(&self) -> AgentState {
        *self.state_rx.borrow()
    }

    #[cfg(test)]
    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Sender for collaborators that report into the session, such as a transcript source.
    #[cfg(test)]
    pub fn input_sender(&self) -> mpsc::Sender<Input> {
        self.input_tx.clone()
    }
}

/// The conversation/form state machine.
///
/// Owns the form, the conversation log, the speech queue and the silence
/// detector, and is the only thing that mutates them. All work happens inside
/// [`run`](Self::run), one event at a time.
pub struct ConversationSession {
    config: SessionConfig,
    state: AgentState,
    form: SongForm,
    target: Option<FormField>,
    conversation: ConversationLog,
    reprompts: u32,
    phase: FormPhase,
    /// Fields answered, skipped or given a fallback in the current form.
    answered: Vec<FormField>,
    /// The reply to the details question, if it was asked.
    details_answer: Option<String>,
    /// Walking every asked field again after a "no" on the review.
    editing: bool,
    song_delivered: bool,
    transcript: Arc<dyn TranscriptSource>,
    permission: Arc<dyn PermissionGate>,
    queue: SpeechQueue<FollowUp>,
    silence: SilenceDetector,
    input_rx: mpsc::Receiver<Input>,
    state_tx: watch::Sender<AgentState>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConversationSession {
    pub fn new(config: SessionConfig, services: VoiceServices) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let (state_tx, state_rx) = watch::channel(AgentState::Uninitialized);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let queue = SpeechQueue::new(
            services.synthesizer,
            services.sink,
            config.voice_id.clone(),
            config.chunk_chars,
        );
        let silence = SilenceDetector::new(config.silence_timeout);

        let session = Self {
            config,
            state: AgentState::Uninitialized,
            form: SongForm::default(),
            target: None,
            conversation: ConversationLog::default(),
            reprompts: 0,
            phase: FormPhase::Filling,
            answered: Vec::new(),
            details_answer: None,
            editing: false,
            song_delivered: false,
            transcript: services.transcript,
            permission: services.permission,
            queue,
            silence,
            input_rx,
            state_tx,
            events: events.clone(),
        };
        let handle = SessionHandle {
            input_tx,
            state_rx,
            events,
        };
        (session, handle)
    }

    /// Runs until [`Input::Shutdown`] or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Conversation session ready.");
        loop {
            let step = tokio::select! {
                input = self.input_rx.recv() => match input {
                    None | Some(Input::Shutdown) => break,
                    Some(input) => self.handle_input(input).await,
                },
                done = self.queue.next_outcome() => self.handle_playback_done(done).await,
                _ = self.silence.expired() => {
                    tracing::info!("User finished speaking.");
                    self.finish_utterance().await
                }
            };

            match step {
                Ok(()) => self.pump(),
                Err(e) => {
                    tracing::error!("Conversation step failed: {:?}. Returning to idle.", e);
                    self.recover(e).await;
                }
            }
        }
        self.close().await;
    }

    async fn handle_input(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Start => self.start().await,
            Input::TranscriptChanged(text) => {
                if self.state == AgentState::Listening && self.silence.touch() {
                    tracing::debug!("Transcript so far: \"{}\"", text);
                } else {
                    tracing::debug!("Ignoring transcript change while {}", self.state);
                }
                Ok(())
            }
            Input::ToggleCapture => self.toggle_capture().await,
            Input::Stop => self.stop().await,
            Input::SubmitText(text) => self.submit_text(text).await,
            Input::NewSong => self.new_song().await,
            Input::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                Ok(())
            }
            Input::Shutdown => Ok(()),
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.state != AgentState::Uninitialized {
            tracing::warn!("Session already started; ignoring start.");
            return Ok(());
        }

        match self.permission.request_microphone().await {
            Permission::Denied => {
                tracing::error!("{}", SessionError::PermissionDenied);
                self.emit(SessionEvent::PermissionDenied);
            }
            Permission::Granted => {
                tracing::info!("Microphone permission granted.");
                self.set_state(AgentState::Idle);
                let welcome = self.config.welcome_message.clone();
                self.say(welcome, None);
                self.advance();
            }
        }
        Ok(())
    }

    async fn toggle_capture(&mut self) -> Result<()> {
        match self.state {
            AgentState::Uninitialized => {
                tracing::warn!("Ignoring capture toggle before the session has started.");
                Ok(())
            }
            AgentState::Listening => {
                let utterance = self.take_transcript().await?;
                self.process_utterance(utterance).await
            }
            AgentState::Speaking => {
                tracing::info!("User interrupted the agent.");
                self.interrupt().await?;
                self.start_listening().await
            }
            AgentState::Idle => self.start_listening().await,
            AgentState::Processing => {
                tracing::warn!("Ignoring capture toggle while processing.");
                Ok(())
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state == AgentState::Uninitialized {
            return Ok(());
        }
        tracing::info!("Stop requested.");
        self.interrupt().await?;
        self.set_state(AgentState::Idle);
        Ok(())
    }

    async fn submit_text(&mut self, text: String) -> Result<()> {
        if self.state == AgentState::Uninitialized {
            tracing::warn!("Ignoring typed input before the session has started.");
            return Ok(());
        }
        self.interrupt().await?;
        self.transcript.reset_transcript();
        self.process_utterance(text).await
    }

    async fn new_song(&mut self) -> Result<()> {
        if self.state == AgentState::Uninitialized {
            tracing::warn!("Ignoring new song request before the session has started.");
            return Ok(());
        }
        self.interrupt().await?;
        self.reset_form();
        self.conversation.clear();
        tracing::info!("Starting a new song.");
        self.say(NEW_TRACK, None);
        self.advance();
        Ok(())
    }

    /// The silence detector fired: the transcript is the user's answer.
    async fn finish_utterance(&mut self) -> Result<()> {
        let utterance = self.take_transcript().await?;
        self.process_utterance(utterance).await
    }

    async fn take_transcript(&mut self) -> Result<String> {
        let utterance = self.transcript.transcript();
        self.transcript.reset_transcript();
        self.stop_capture().await?;
        Ok(utterance)
    }

    async fn process_utterance(&mut self, utterance: String) -> Result<()> {
        self.set_state(AgentState::Processing);
        if !utterance.trim().is_empty() {
            tracing::info!("User said: \"{}\"", utterance);
            let turn = self.conversation.push(Speaker::User, utterance.as_str());
            self.emit(SessionEvent::Turn(turn));
        }

        match self.phase {
            FormPhase::Completed => {
                self.offer_another_song();
                return Ok(());
            }
            FormPhase::Reviewing => return self.handle_review(&utterance).await,
            FormPhase::Filling => {}
        }

        if let Some(command) = VoiceCommand::detect(&utterance) {
            return self.handle_command(command).await;
        }

        let extracted = extract(&utterance, self.target);
        tracing::debug!("Extracted fields: {:?}", extracted);

        self.form.set(
            FormField::AdditionalDetails,
            extracted
                .additional_details
                .as_deref()
                .unwrap_or(utterance.as_str()),
        );

        if self.config.fill_untargeted {
            let found: Vec<(FormField, String)> = extracted
                .iter()
                .filter(|(field, value)| {
                    Some(*field) != self.target
                        && self.config.is_required(*field)
                        && !self.answered.contains(field)
                        && !value.trim().is_empty()
                })
                .map(|(field, value)| (field, value.to_string()))
                .collect();
            for (field, value) in found {
                self.fill(field, value);
            }
        }

        let Some(target) = self.target else {
            self.advance();
            return Ok(());
        };

        let value = match target {
            FormField::AdditionalDetails if Confirmation::is_refusal(&utterance) => {
                Some(String::new())
            }
            _ => extracted
                .get(target)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string),
        };
        match value {
            Some(value) => {
                self.say(confirmation_for(target, &value), None);
                self.fill(target, value);
                self.advance();
            }
            None => self.reprompt(target),
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: VoiceCommand) -> Result<()> {
        tracing::info!("Voice command: {:?}", command);
        match command {
            VoiceCommand::StartOver => return self.new_song().await,
            VoiceCommand::GoBack => {
                let asked = self.config.asked_fields();
                let position = self
                    .target
                    .and_then(|target| asked.iter().position(|field| *field == target))
                    .unwrap_or(asked.len());
                if position == 0 {
                    let question = question_for(self.target, &self.form);
                    self.ask(format!("This is the first question. {question}"));
                } else {
                    self.go_back_to(asked[position - 1]);
                }
            }
            VoiceCommand::Skip => match self.target {
                // An answered field keeps its answer.
                Some(field) if self.answered.contains(&field) => self.advance(),
                Some(field) if self.config.is_required(field) => {
                    let question = question_for(Some(field), &self.form);
                    self.ask(format!("I'm sorry, {} is required. {}", field.label(), question));
                }
                Some(field) => {
                    tracing::info!("Skipping optional {}.", field);
                    self.fill(field, field.fallback_value());
                    self.advance();
                }
                None => self.advance(),
            },
            VoiceCommand::Help => {
                let label = self.target.map_or("this step", |field| field.label());
                let question = question_for(self.target, &self.form);
                self.ask(format!(
                    "For {label}, {question} You can say \"go back\" to return to the previous question, or \"skip\" to move on if it's optional."
                ));
            }
        }
        Ok(())
    }

    async fn handle_review(&mut self, utterance: &str) -> Result<()> {
        match VoiceCommand::detect(utterance) {
            Some(VoiceCommand::StartOver) => return self.new_song().await,
            Some(VoiceCommand::GoBack) => {
                if let Some(last) = self.config.asked_fields().last().copied() {
                    self.phase = FormPhase::Filling;
                    self.go_back_to(last);
                    return Ok(());
                }
            }
            Some(VoiceCommand::Help) => {
                self.ask(REVIEW_HELP.to_string());
                return Ok(());
            }
            Some(VoiceCommand::Skip) | None => {}
        }

        match Confirmation::detect(utterance) {
            Some(Confirmation::Yes) => {
                tracing::info!("Review confirmed.");
                self.deliver_song();
            }
            Some(Confirmation::No) => self.start_editing(),
            None => {
                self.reprompts += 1;
                if self.reprompts > self.config.max_reprompts {
                    tracing::warn!("No clear answer to the review; composing anyway.");
                    self.say(REVIEW_FALLBACK, None);
                    self.deliver_song();
                } else {
                    self.ask(REVIEW_REPROMPT.to_string());
                }
            }
        }
        Ok(())
    }

    fn go_back_to(&mut self, field: FormField) {
        self.target = Some(field);
        self.reprompts = 0;
        let question = question_for(Some(field), &self.form);
        self.ask(format!("Let's go back to {}. {}", field.label(), question));
    }

    /// Re-asks every field in order, starting from the first.
    fn start_editing(&mut self) {
        let Some(first) = self.config.asked_fields().first().copied() else {
            self.deliver_song();
            return;
        };
        tracing::info!("Editing the answers.");
        self.phase = FormPhase::Filling;
        self.editing = true;
        self.reprompts = 0;
        self.target = Some(first);
        let question = question_for(Some(first), &self.form);
        self.ask(format!(
            "Let's edit your track. Starting with {}. {}",
            first.label(),
            question
        ));
    }

    /// Asks for the next field, or wraps the form up once there is none.
    fn advance(&mut self) {
        let asked = self.config.asked_fields();
        self.target = if self.editing {
            self.target
                .and_then(|current| asked.iter().position(|field| *field == current))
                .and_then(|position| asked.get(position + 1).copied())
        } else {
            asked
                .into_iter()
                .find(|field| !self.answered.contains(field))
        };
        match self.target {
            Some(field) => {
                let question = question_for(Some(field), &self.form);
                self.ask(question);
            }
            None => {
                self.editing = false;
                self.finish_form();
            }
        }
    }

    fn finish_form(&mut self) {
        // Only an answer to the details question counts as details.
        let details = self.details_answer.clone().unwrap_or_default();
        self.form.set(FormField::AdditionalDetails, details);

        if self.config.review_before_compose {
            self.phase = FormPhase::Reviewing;
            self.reprompts = 0;
            let review = review_for(&self.form, &self.config.asked_fields());
            self.ask(review);
        } else {
            let closing = question_for(None, &self.form);
            self.say(closing, None);
            self.deliver_song();
        }
    }

    fn reprompt(&mut self, field: FormField) {
        self.reprompts += 1;
        if self.reprompts > self.config.max_reprompts {
            // A field being edited keeps its earlier answer.
            let value = if self.answered.contains(&field) {
                self.form.get(field).to_string()
            } else {
                field.fallback_value().to_string()
            };
            tracing::warn!(
                "No usable answer for {} after {} re-prompts; using \"{}\".",
                field,
                self.config.max_reprompts,
                value
            );
            if value.is_empty() {
                self.say("No worries, let's move on.", None);
            } else {
                self.say(format!("No worries, let's go with {value} for now."), None);
            }
            self.fill(field, value);
            self.advance();
        } else {
            tracing::info!("Re-prompting for {} (attempt {}).", field, self.reprompts);
            let question = question_for(Some(field), &self.form);
            self.ask(format!("Sorry, I didn't catch that. {question}"));
        }
    }

    fn deliver_song(&mut self) {
        self.phase = FormPhase::Completed;
        self.target = None;
        self.form = self.form.with_fallbacks();
        tracing::info!("Form complete: {:?}", self.form);
        self.emit(SessionEvent::FormCompleted(self.form.clone()));

        let song = compose(&self.form);
        tracing::info!("Composed \"{}\" ({} sections).", song.title, song.sections.len());

        let intro = format!(
            "Great! I've created an awesome track for {}. Here it is:",
            self.form.character_name
        );
        if song.sections.is_empty() {
            self.say(intro, Some(FollowUp::SongDelivered));
        } else {
            self.say(intro, None);
            let last = song.sections.len() - 1;
            for (index, section) in song.sections.iter().enumerate() {
                let pause = if index == 0 {
                    Duration::ZERO
                } else {
                    self.config.section_pause
                };
                let follow_up = (index == last).then_some(FollowUp::SongDelivered);
                self.queue
                    .enqueue_after(pause, section.text.clone(), follow_up);
            }
        }
        self.emit(SessionEvent::SongReady(song));
    }

    fn offer_another_song(&mut self) {
        tracing::info!("Song delivered; offering another one.");
        self.reset_form();
        self.target = self.config.asked_fields().first().copied();
        self.say(ANOTHER_SONG, Some(FollowUp::Listen));
        self.emit(SessionEvent::QuestionAsked(self.target));
    }

    fn reset_form(&mut self) {
        self.form.reset();
        self.reprompts = 0;
        self.phase = FormPhase::Filling;
        self.answered.clear();
        self.details_answer = None;
        self.editing = false;
        self.song_delivered = false;
        self.target = None;
        self.emit(SessionEvent::Reset);
    }

    fn fill(&mut self, field: FormField, value: impl Into<String>) {
        let value = value.into();
        tracing::info!("Filled {} = \"{}\"", field, value);
        self.form.set(field, value.clone());
        if field == FormField::AdditionalDetails {
            self.details_answer = Some(value.clone());
        }
        if !self.answered.contains(&field) {
            self.answered.push(field);
        }
        self.reprompts = 0;
        self.emit(SessionEvent::FieldFilled { field, value });
    }

    /// Speaks `question` and listens for the answer.
    fn ask(&mut self, question: String) {
        self.say(question, Some(FollowUp::Listen));
        self.emit(SessionEvent::QuestionAsked(self.target));
    }

    fn say(&mut self, text: impl Into<String>, follow_up: Option<FollowUp>) {
        self.queue.enqueue(text, follow_up);
    }

    /// Starts the next queued utterance if nothing is playing.
    fn pump(&mut self) {
        if let Some(text) = self.queue.pump() {
            tracing::info!("Agent says: \"{}\"", text);
            let turn = self.conversation.push(Speaker::Agent, text);
            self.emit(SessionEvent::Turn(turn));
            self.set_state(AgentState::Speaking);
        }
    }

    async fn handle_playback_done(&mut self, done: PlaybackDone) -> Result<()> {
        let follow_up = match self.queue.settle(done) {
            Settled::Stale => return Ok(()),
            Settled::Failed(e) => return Err(e.context("Speech playback failed")),
            Settled::Completed(follow_up) => follow_up,
        };

        if follow_up == Some(FollowUp::SongDelivered) {
            tracing::info!("Song delivered.");
            self.song_delivered = true;
        }
        if self.queue.has_pending() {
            return Ok(());
        }

        match follow_up {
            Some(FollowUp::Listen) | Some(FollowUp::SongDelivered) => self.start_listening().await,
            None => {
                self.set_state(AgentState::Idle);
                Ok(())
            }
        }
    }

    async fn start_listening(&mut self) -> Result<()> {
        self.transcript.reset_transcript();
        self.transcript
            .start_listening(&self.config.listen_options)
            .await
            .map_err(|e| SessionError::Capture(format!("{e:#}")))?;
        self.silence.arm();
        self.set_state(AgentState::Listening);
        Ok(())
    }

    async fn stop_capture(&mut self) -> Result<()> {
        self.silence.disarm();
        if self.transcript.is_capturing() {
            self.transcript
                .stop_listening()
                .await
                .context("Failed to stop transcript capture")?;
        }
        Ok(())
    }

    /// Cuts off playback and capture. Nothing queued before this call will run.
    async fn interrupt(&mut self) -> Result<()> {
        self.queue.clear().await;
        self.stop_capture().await
    }

    async fn recover(&mut self, error: anyhow::Error) {
        self.queue.clear().await;
        if let Err(e) = self.stop_capture().await {
            tracing::warn!("Failed to stop capture during recovery: {:?}", e);
        }
        if self.state != AgentState::Uninitialized {
            self.set_state(AgentState::Idle);
        }
        self.emit(SessionEvent::Error(format!("{error:#}")));
    }

    async fn close(&mut self) {
        self.queue.clear().await;
        if let Err(e) = self.stop_capture().await {
            tracing::warn!("Failed to stop capture on shutdown: {:?}", e);
        }
        tracing::info!("Conversation session closed.");
    }

    fn set_state(&mut self, to: AgentState) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::info!("State: {} -> {}", from, to);
        self.state = to;
        self.state_tx.send_replace(to);
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            form: self.form.clone(),
            target: self.target,
            phase: self.phase,
            conversation: self.conversation.turns().to_vec(),
            pending_speech: self.queue.outstanding(),
            song_delivered: self.song_delivered,
        }
    }
}
