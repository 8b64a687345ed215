//! Chat state machine
//!
//! Owns the channel state, the pending audio turn, its boundary timer and
//! the transcript. It does no I/O: the session runner feeds it events and
//! drains the outbound text frames and view updates it produces, one event at
//! a time.
//!
//! Both the quiet-period timer and a forced flush go through
//! `flush_turn`, which disarms the timer before splicing, so a turn
//! is committed at most once.

use crate::audio_frame::SplicedAudio;
use crate::debounce::TurnBoundaryDetector;
use crate::error::{ChatError, PlaybackRejection, SendRejection};
use crate::events::{ChannelState, Event, SessionUpdate};
use crate::transcript::{EntryContent, EntryId, Origin, TranscriptStore};
use crate::turn::TurnAccumulator;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct ChatFsm {
    /// State of the current channel handle
    state: ChannelState,

    /// Bumped on every connect attempt
    generation: u64,

    turn: TurnAccumulator,
    detector: TurnBoundaryDetector,
    transcript: TranscriptStore,

    audio_enabled: bool,
    awaiting_reply: bool,

    /// Text frames to transmit (drained after each event)
    outbound: Vec<String>,
    /// View updates (drained after each event)
    updates: Vec<SessionUpdate>,
}

impl ChatFsm {
    pub fn new(quiet_period: Duration, audio_enabled: bool) -> Self {
        Self {
            state: ChannelState::Idle,
            generation: 0,
            turn: TurnAccumulator::new(),
            detector: TurnBoundaryDetector::new(quiet_period),
            transcript: TranscriptStore::new(),
            audio_enabled,
            awaiting_reply: false,
            outbound: Vec::new(),
            updates: Vec::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn pending_frames(&self) -> usize {
        self.turn.frame_count()
    }

    /// When the current turn will be closed if no further frame arrives.
    pub fn turn_deadline(&self) -> Option<Instant> {
        self.detector.deadline()
    }

    /// Start a new channel handle. Refused while one is connecting or open.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            ChannelState::Connecting | ChannelState::Open => {
                debug!("Connect requested while {:?}, ignoring", self.state);
                false
            }
            ChannelState::Idle | ChannelState::Closed => {
                self.generation += 1;
                info!("🔌 Connecting (attempt #{})", self.generation);
                self.set_state(ChannelState::Connecting);
                true
            }
        }
    }

    /// The bearer token went away: the channel must not stay open.
    pub fn sign_out(&mut self) {
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            self.close(ChatError::AuthUnavailable);
        }
        self.updates.push(SessionUpdate::SignInRequired);
    }

    /// Close without reporting an error, e.g. on teardown.
    pub fn shutdown(&mut self) {
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            self.detector.cancel();
            self.turn.discard();
            self.set_awaiting(false);
            self.set_state(ChannelState::Closed);
        }
    }

    pub fn on_event(&mut self, event: Event) {
        self.on_event_at(event, Instant::now());
    }

    /// Process an event observed at `now`.
    pub fn on_event_at(&mut self, event: Event, now: Instant) {
        match (self.state, event) {
            (ChannelState::Connecting, Event::Connected) => {
                info!("✅ Chat channel open");
                self.set_state(ChannelState::Open);
            }

            (ChannelState::Connecting, Event::ConnectFailed(reason)) => {
                self.close(ChatError::ConnectFailure(reason));
            }

            (ChannelState::Connecting | ChannelState::Open, Event::Disconnected(reason)) => {
                self.close(ChatError::ChannelClosed(reason));
            }

            (ChannelState::Open, Event::TextReceived(text)) => {
                debug!("📥 Text from peer: {}", text.chars().take(50).collect::<String>());
                self.set_awaiting(false);
                let entry = self
                    .transcript
                    .append(Origin::Remote, EntryContent::Text(text))
                    .clone();
                self.updates.push(SessionUpdate::EntryAppended(entry));
            }

            (ChannelState::Open, Event::BinaryReceived) => {
                self.set_awaiting(false);
            }

            (ChannelState::Open, Event::FrameDecoded(Ok(frame))) => {
                debug!(
                    "🎵 Frame of {} samples ({} pending)",
                    frame.len(),
                    self.turn.frame_count()
                );
                self.turn.append(frame);
                self.detector.on_frame_appended(now);
            }

            (ChannelState::Open, Event::FrameDecoded(Err(e))) => {
                warn!("Dropping undecodable audio chunk: {}", e);
                self.updates.push(SessionUpdate::Notice(ChatError::Decode(e)));
            }

            (state, event) => {
                debug!("Ignoring {} while {:?}", event.name(), state);
            }
        }
    }

    /// Close the current turn if its quiet period has passed.
    pub fn check_turn_timeout(&mut self, now: Instant) -> bool {
        if self.detector.poll_elapsed(now) {
            debug!("⏱️ Quiet period elapsed, closing audio turn");
            self.flush_turn();
            true
        } else {
            false
        }
    }

    /// Close the current turn now, whether or not its timer is pending.
    pub fn force_flush(&mut self) {
        self.flush_turn();
    }

    /// Record a user message and queue it for transmission.
    ///
    /// Any audio turn still accumulating is committed first so it lands
    /// before the message in the transcript.
    pub fn send_text(&mut self, text: &str) -> Result<EntryId, ChatError> {
        if self.state != ChannelState::Open {
            return Err(ChatError::SendRejected(SendRejection::NotConnected));
        }
        if text.trim().is_empty() {
            return Err(ChatError::SendRejected(SendRejection::EmptyMessage));
        }
        if self.awaiting_reply {
            return Err(ChatError::SendRejected(SendRejection::ReplyPending));
        }

        self.flush_turn();

        let entry = self
            .transcript
            .append(Origin::Local, EntryContent::Text(text.to_string()))
            .clone();
        let id = entry.id;
        self.updates.push(SessionUpdate::EntryAppended(entry));
        self.outbound.push(text.to_string());
        self.set_awaiting(true);
        Ok(id)
    }

    /// The audio to drive to the output for `id`.
    pub fn play(&self, id: EntryId) -> Result<SplicedAudio, ChatError> {
        let entry = self
            .transcript
            .get(id)
            .ok_or(ChatError::PlaybackPrecondition(PlaybackRejection::UnknownEntry))?;
        let EntryContent::Audio(audio) = &entry.content else {
            return Err(ChatError::PlaybackPrecondition(PlaybackRejection::NotAudio));
        };
        if !self.audio_enabled {
            return Err(ChatError::PlaybackPrecondition(PlaybackRejection::AudioDisabled));
        }
        Ok(audio.clone())
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        if self.audio_enabled != enabled {
            info!("🔈 Audio {}", if enabled { "enabled" } else { "disabled" });
            self.audio_enabled = enabled;
            self.updates.push(SessionUpdate::AudioEnabled(enabled));
        }
    }

    /// Drain pending outbound text frames
    pub fn drain_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    /// Drain pending view updates
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        std::mem::take(&mut self.updates)
    }

    // === Helper methods ===

    fn flush_turn(&mut self) {
        self.detector.cancel();
        match self.turn.flush() {
            Ok(Some(audio)) => {
                info!(
                    "🎧 Audio turn complete: {} samples, {:.2}s",
                    audio.len(),
                    audio.duration().as_secs_f32()
                );
                let entry = self
                    .transcript
                    .append(Origin::Remote, EntryContent::Audio(audio))
                    .clone();
                self.updates.push(SessionUpdate::EntryAppended(entry));
            }
            Ok(None) => {}
            Err(mismatch) => {
                warn!("Discarding audio turn: {}", mismatch);
                self.updates
                    .push(SessionUpdate::Notice(ChatError::SpliceMismatch(mismatch)));
            }
        }
    }

    fn close(&mut self, reason: ChatError) {
        self.detector.cancel();
        let dropped = self.turn.discard();
        if dropped > 0 {
            info!("Discarded partial audio turn of {} frames", dropped);
        }
        self.set_awaiting(false);
        warn!("❌ Chat channel closed: {}", reason);
        self.set_state(ChannelState::Closed);
        self.updates.push(SessionUpdate::Notice(reason));
    }

    fn set_state(&mut self, state: ChannelState) {
        self.state = state;
        self.updates.push(SessionUpdate::Status(state));
    }

    fn set_awaiting(&mut self, awaiting: bool) {
        if self.awaiting_reply != awaiting {
            self.awaiting_reply = awaiting;
            self.updates.push(SessionUpdate::AwaitingReply(awaiting));
        }
    }
}
