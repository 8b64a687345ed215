//! wavechat - chat client for a peer that answers in text and streamed audio
//!
//! Inbound audio arrives as independently encoded chunks with no end-of-turn
//! marker. The client decodes each chunk, collects the frames of the current
//! turn, closes the turn after a quiet period (or when the user sends a
//! message) and splices it into one playable unit in the transcript.

#![forbid(unsafe_code)]

/// Decoded frames and spliced audio
pub mod audio_frame;
/// Chat state machine
pub mod chat_fsm;
/// Session configuration
pub mod config;
/// Turn boundary timer
pub mod debounce;
/// Chunk decoders and the receipt-order decode queue
pub mod decoder;
/// Error types
pub mod error;
/// Session events, commands and view updates
pub mod events;
/// Audio output sinks
pub mod playback;
/// Async session loop
pub mod session_runner;
/// Append-only transcript
pub mod transcript;
/// Turn accumulation and splicing
pub mod turn;
/// Websocket channel
pub mod ws_client;

pub use audio_frame::{AudioFrame, SplicedAudio};
pub use config::SessionConfig;
pub use error::ChatError;
pub use events::{ChannelState, Command, SessionUpdate};
pub use session_runner::{spawn, SessionHandle};
pub use transcript::{EntryContent, EntryId, Origin, TranscriptEntry};
