//! The live voice session: one state machine that owns the devices, the
//! remote connection and the playback clock.
//!
//! Device callbacks and the network receive task never touch session state
//! directly. They post [`SessionEvent`]s through an [`EventSink`] stamped with
//! the epoch of the run that created it, and [`Session::run`] consumes them
//! one at a time alongside user [`Command`]s. Bumping the epoch on every
//! start makes late events from a torn-down run harmless.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use live_voice_types::InboundEvent;
use tokio::sync::{broadcast, mpsc};

use crate::backend::AudioBackend;
use crate::capture::AudioSender;
use crate::client::consts::OUTBOUND_CAPACITY;
use crate::client::{Connector, LiveConnection};
use crate::error::SessionError;
use crate::lifecycle::SessionResources;
use crate::playback::{AudioBuffer, PlaybackScheduler, SourceId};

mod state;
mod stats;

pub use state::SessionState;
pub use stats::SessionStats;

const UPDATE_CAPACITY: usize = 256;

/// The remote handshake of one start, detached from the session borrow so the
/// loop can keep reading commands while it runs.
type PendingConnect = BoxFuture<'static, Result<Box<dyn LiveConnection>, SessionError>>;

/// Something that happened outside the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The remote side accepted the setup.
    Opened,
    Inbound(InboundEvent),
    /// A scheduled source played to its end.
    SourceEnded(SourceId),
    /// An audio device failed after acquisition.
    DeviceFault(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub epoch: u64,
    pub event: SessionEvent,
}

/// Producer handle given to callbacks and tasks of one session run.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { epoch, tx }
    }

    /// Returns `false` once the session is gone.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx
            .send(Envelope {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Start when idle, stop otherwise.
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// A short user-facing message about the session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    fn new(level: NotificationLevel, message: &str) -> Self {
        Self {
            level,
            message: message.to_string(),
        }
    }
}

/// What subscribers see of a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    State(SessionState),
    /// Model speech transcript delta.
    Transcript(String),
    /// User speech transcript delta.
    UserTranscript(String),
    Notification(Notification),
}

pub type UpdateRx = broadcast::Receiver<SessionUpdate>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sent as the first message of every connection.
    pub setup: live_voice_types::Session,
    /// Encoded capture windows that may wait for the network before new ones are dropped.
    pub outbound_capacity: usize,
}

impl SessionConfig {
    pub fn new(setup: live_voice_types::Session) -> Self {
        Self {
            setup,
            outbound_capacity: OUTBOUND_CAPACITY,
        }
    }
}

pub struct Session<B: AudioBackend, C: Connector> {
    backend: B,
    connector: Arc<C>,
    config: SessionConfig,
    state: SessionState,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    updates: broadcast::Sender<SessionUpdate>,
    resources: SessionResources,
    scheduler: PlaybackScheduler,
    capture: Option<AudioSender>,
    transcript: String,
    stats: SessionStats,
}

enum Next {
    Command(Option<Command>),
    Event(Envelope),
    Connected(Result<Box<dyn LiveConnection>, SessionError>),
}

impl<B: AudioBackend, C: Connector + 'static> Session<B, C> {
    pub fn new(backend: B, connector: C, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            backend,
            connector: Arc::new(connector),
            config,
            state: SessionState::Idle,
            epoch: 0,
            events_tx,
            events_rx,
            updates,
            resources: SessionResources::new(),
            scheduler: PlaybackScheduler::new(),
            capture: None,
            transcript: String::new(),
            stats: SessionStats::new(),
        }
    }

    pub fn subscribe(&self) -> UpdateRx {
        self.updates.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Model transcript of the current (or last) run.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        if let Some(capture) = &self.capture {
            stats.set_capture_dropped(capture.dropped());
        }
        stats
    }

    /// Sources scheduled and not yet finished.
    pub fn playing(&self) -> usize {
        self.scheduler.playing()
    }

    pub fn resources_held(&self) -> bool {
        !self.resources.is_empty()
    }

    /// Acquires the devices and connects. Does nothing unless idle.
    ///
    /// On failure everything acquired so far is released, the session is
    /// back in `Idle` and the error is returned after being reported.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let Some(connect) = self.begin()? else {
            return Ok(());
        };
        let epoch = self.epoch;
        let result = connect.await;
        self.finish_connect(epoch, result)
    }

    /// Moves to `Connecting` and acquires the local devices. The returned
    /// handshake owns everything it needs and holds no borrow of the session.
    fn begin(&mut self) -> Result<Option<PendingConnect>, SessionError> {
        if self.state != SessionState::Idle {
            tracing::debug!("start ignored, session is {}", self.state);
            return Ok(None);
        }
        self.epoch += 1;
        self.transcript.clear();
        self.stats = SessionStats::new();
        self.set_state(SessionState::Connecting);

        match self.acquire_devices() {
            Ok(connect) => Ok(Some(connect)),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn acquire_devices(&mut self) -> Result<PendingConnect, SessionError> {
        let sink = EventSink::new(self.epoch, self.events_tx.clone());

        let output = self.backend.open_output(sink.clone())?;
        self.resources.output = Some(output);

        let (tx, rx) = mpsc::channel(self.config.outbound_capacity);
        let sender = AudioSender::new(tx);
        let microphone = self.backend.open_microphone(sender.clone(), sink.clone())?;
        self.resources.microphone = Some(microphone);
        self.capture = Some(sender);

        let connector = self.connector.clone();
        let setup = self.config.setup.clone();
        Ok(async move { connector.connect(setup, rx, sink).await }.boxed())
    }

    /// Stores the connection of the run identified by `epoch`. A connection
    /// that arrives after that run was stopped is closed right away.
    fn finish_connect(
        &mut self,
        epoch: u64,
        result: Result<Box<dyn LiveConnection>, SessionError>,
    ) -> Result<(), SessionError> {
        if epoch != self.epoch || !self.state.is_active() {
            tracing::debug!("discarding handshake of stopped session {}", epoch);
            if let Ok(mut connection) = result {
                if let Err(e) = connection.close() {
                    tracing::debug!("ignoring close error: {}", e);
                }
            }
            return Ok(());
        }
        match result {
            Ok(connection) => {
                tracing::info!("session {} connected, waiting for setup", self.epoch);
                self.resources.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Releases everything and returns to `Idle`. Safe to call at any time.
    pub fn stop(&mut self) {
        let was_active = self.state.is_active();
        self.teardown();
        self.set_state(SessionState::Idle);
        if was_active {
            tracing::info!("session {} ended", self.epoch);
            self.notify(NotificationLevel::Info, "Voice session ended");
        }
    }

    /// Applies one event from a device callback or the connection.
    pub fn handle_event(&mut self, envelope: Envelope) {
        if envelope.epoch != self.epoch || !self.state.is_active() {
            tracing::debug!(
                "dropping stale event from epoch {} (current {}, {}): {:?}",
                envelope.epoch,
                self.epoch,
                self.state,
                envelope.event
            );
            return;
        }
        let result = match envelope.event {
            SessionEvent::Opened => self.on_open(),
            SessionEvent::Inbound(event) => self.on_inbound(event),
            SessionEvent::SourceEnded(id) => {
                if self.scheduler.source_ended(id) {
                    self.set_state(self.state.on_turn_end());
                }
                Ok(())
            }
            SessionEvent::DeviceFault(message) => Err(SessionError::DeviceAcquisition(message)),
        };
        if let Err(e) = result {
            self.fail(&e);
        }
    }

    /// Applies a command and waits for any handshake it starts.
    pub async fn handle_command(&mut self, command: Command) {
        if let Some(connect) = self.dispatch(command) {
            let epoch = self.epoch;
            let result = connect.await;
            if let Err(e) = self.finish_connect(epoch, result) {
                tracing::warn!("connect failed: {}", e);
            }
        }
    }

    /// Applies a command up to the point where it would wait on the network.
    fn dispatch(&mut self, command: Command) -> Option<PendingConnect> {
        tracing::debug!("command: {:?}", command);
        let start = match command {
            Command::Start => true,
            Command::Stop => false,
            Command::Toggle => !self.state.is_active(),
        };
        if !start {
            self.stop();
            return None;
        }
        match self.begin() {
            Ok(connect) => connect,
            Err(e) => {
                tracing::warn!("start failed: {}", e);
                None
            }
        }
    }

    /// Drives the session until the command channel closes, then stops it.
    ///
    /// A handshake in progress is polled alongside commands and events, so a
    /// stop releases the local devices at once and abandons the handshake.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        let mut pending: Option<(u64, PendingConnect)> = None;
        loop {
            let next = tokio::select! {
                command = commands.recv() => Next::Command(command),
                Some(envelope) = self.events_rx.recv() => Next::Event(envelope),
                result = async {
                    match pending.as_mut() {
                        Some((_, connect)) => connect.await,
                        None => std::future::pending().await,
                    }
                } => Next::Connected(result),
            };
            match next {
                Next::Command(Some(command)) => {
                    if let Some(connect) = self.dispatch(command) {
                        pending = Some((self.epoch, connect));
                    }
                }
                Next::Command(None) => break,
                Next::Event(envelope) => self.handle_event(envelope),
                Next::Connected(result) => {
                    if let Some((epoch, _)) = pending.take() {
                        if let Err(e) = self.finish_connect(epoch, result) {
                            tracing::warn!("connect failed: {}", e);
                        }
                    }
                }
            }
            if !self.state.is_active() && pending.take().is_some() {
                tracing::debug!("abandoned handshake of session {}", self.epoch);
            }
        }
        self.stop();
    }

    fn on_open(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Connecting {
            tracing::warn!("unexpected setup completion while {}", self.state);
            return Ok(());
        }
        if let Some(microphone) = self.resources.microphone.as_mut() {
            microphone.resume()?;
        }
        self.set_state(SessionState::Listening);
        self.notify(NotificationLevel::Success, "Voice session active");
        Ok(())
    }

    fn on_inbound(&mut self, event: InboundEvent) -> Result<(), SessionError> {
        match event {
            InboundEvent::InputTranscription(text) => {
                tracing::debug!("user: {}", text);
                self.publish(SessionUpdate::UserTranscript(text));
            }
            InboundEvent::TranscriptionDelta(text) => {
                self.transcript.push_str(&text);
                self.publish(SessionUpdate::Transcript(text));
            }
            InboundEvent::AudioDelta(data) => {
                let buffer = AudioBuffer::from_base64_pcm16(&data)?;
                let seconds = buffer.duration();
                let Some(output) = self.resources.output_mut() else {
                    tracing::warn!("audio received without an output context");
                    return Ok(());
                };
                if self.scheduler.schedule(output, buffer)?.is_some() {
                    self.stats.record_audio(seconds);
                    self.set_state(self.state.on_audio());
                }
            }
            InboundEvent::TurnComplete => {
                self.stats.record_turn();
                self.set_state(self.state.on_turn_end());
            }
            InboundEvent::Interrupted => {
                tracing::info!("interrupted, purging {} sources", self.scheduler.playing());
                match self.resources.output_mut() {
                    Some(output) => self.scheduler.interrupt(output),
                    None => self.scheduler.reset(),
                }
                self.stats.record_interruption();
                self.set_state(self.state.on_interrupted());
            }
            InboundEvent::Error(message) => return Err(SessionError::Transport(message)),
            InboundEvent::Closed(reason) => {
                tracing::info!("remote closed the session: {:?}", reason);
                self.stop();
            }
        }
        Ok(())
    }

    /// Error, full teardown, then idle with a single notification. Never retries.
    fn fail(&mut self, error: &SessionError) {
        tracing::error!("session {} failed: {}", self.epoch, error);
        let acquiring = self.state == SessionState::Connecting;
        self.set_state(SessionState::Error);
        self.teardown();
        self.set_state(SessionState::Idle);

        let message = match error {
            SessionError::DeviceAcquisition(_) if acquiring => "Could not access microphone",
            _ => "Voice session error",
        };
        self.notify(NotificationLevel::Error, message);
    }

    fn teardown(&mut self) {
        self.resources.release(&mut self.scheduler);
        if let Some(capture) = self.capture.take() {
            self.stats.set_capture_dropped(capture.dropped());
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!("session state: {} -> {}", self.state, state);
        self.state = state;
        self.publish(SessionUpdate::State(state));
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.publish(SessionUpdate::Notification(Notification::new(level, message)));
    }

    fn publish(&self, update: SessionUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}
