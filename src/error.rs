//! Error types for the chat session
//!
//! Per-chunk and per-request failures are reported as values and never tear
//! the session down; only channel-level failures close the channel.

use std::fmt;

/// A single inbound audio chunk could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty audio chunk")]
    Empty,

    #[error("malformed audio chunk: {0}")]
    Malformed(String),

    #[error("invalid frame layout: {0}")]
    InvalidLayout(String),

    #[error("decode task failed: {0}")]
    TaskFailed(String),
}

/// Frames accumulated within one turn disagree on shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "frame {index} is {found_channels}ch@{found_rate}Hz, turn started as {expected_channels}ch@{expected_rate}Hz"
)]
pub struct SpliceMismatch {
    pub index: usize,
    pub expected_channels: usize,
    pub expected_rate: u32,
    pub found_channels: usize,
    pub found_rate: u32,
}

/// Why an outbound message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    NotConnected,
    EmptyMessage,
    ReplyPending,
}

impl fmt::Display for SendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendRejection::NotConnected => write!(f, "not connected"),
            SendRejection::EmptyMessage => write!(f, "message is empty"),
            SendRejection::ReplyPending => write!(f, "still waiting for a reply"),
        }
    }
}

/// Why a playback request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRejection {
    UnknownEntry,
    NotAudio,
    AudioDisabled,
}

impl fmt::Display for PlaybackRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackRejection::UnknownEntry => write!(f, "no such entry"),
            PlaybackRejection::NotAudio => write!(f, "entry is not audio"),
            PlaybackRejection::AudioDisabled => write!(f, "audio is disabled"),
        }
    }
}

/// Errors surfaced to whoever drives the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("no valid bearer token, sign in required")]
    AuthUnavailable,

    #[error("failed to connect to chat server: {0}")]
    ConnectFailure(String),

    #[error("chat channel closed: {0}")]
    ChannelClosed(String),

    #[error("audio chunk dropped: {0}")]
    Decode(#[from] DecodeError),

    #[error("audio turn discarded: {0}")]
    SpliceMismatch(#[from] SpliceMismatch),

    #[error("cannot send message: {0}")]
    SendRejected(SendRejection),

    #[error("cannot play entry: {0}")]
    PlaybackPrecondition(PlaybackRejection),

    #[error("audio output failed: {0}")]
    Output(String),
}

/// Errors from an audio output sink.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("output device error: {0}")]
    Device(String),
}

impl From<PlaybackError> for ChatError {
    fn from(e: PlaybackError) -> Self {
        ChatError::Output(e.to_string())
    }
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported URL scheme {0:?}, expected ws or wss")]
    Scheme(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
