//! Turn accumulation
//!
//! Frames of the current inbound turn are kept as received and spliced once,
//! when the turn is flushed.

use crate::audio_frame::{AudioFrame, ChannelSamples, SplicedAudio};
use crate::error::SpliceMismatch;
use tracing::debug;

/// The frames of the turn currently being received.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    frames: Vec<AudioFrame>,
    active: bool,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame to the current turn, starting one if none is active.
    pub fn append(&mut self, frame: AudioFrame) {
        if !self.active {
            debug!("Starting new audio turn");
        }
        self.frames.push(frame);
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Splice the pending frames into one unit and return to rest.
    ///
    /// `Ok(None)` when nothing is pending or the pending frames hold no
    /// samples. On a shape mismatch the turn is still cleared, so a bad turn
    /// never leaks into the next one.
    pub fn flush(&mut self) -> Result<Option<SplicedAudio>, SpliceMismatch> {
        let frames = std::mem::take(&mut self.frames);
        self.active = false;
        if frames.iter().all(AudioFrame::is_empty) {
            if !frames.is_empty() {
                debug!("Dropping audio turn of {} empty frames", frames.len());
            }
            return Ok(None);
        }
        splice(frames).map(Some)
    }

    /// Drop the pending turn without splicing. Returns the frames dropped.
    pub fn discard(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        self.active = false;
        n
    }
}

/// Concatenate each channel across frames, in order. `frames` must be non-empty.
fn splice(frames: Vec<AudioFrame>) -> Result<SplicedAudio, SpliceMismatch> {
    let expected_channels = frames[0].channel_count();
    let expected_rate = frames[0].sample_rate();

    if let Some((index, bad)) = frames.iter().enumerate().find(|(_, f)| {
        f.channel_count() != expected_channels || f.sample_rate() != expected_rate
    }) {
        return Err(SpliceMismatch {
            index,
            expected_channels,
            expected_rate,
            found_channels: bad.channel_count(),
            found_rate: bad.sample_rate(),
        });
    }

    let total: usize = frames.iter().map(AudioFrame::len).sum();
    let mut channels: ChannelSamples = (0..expected_channels)
        .map(|_| Vec::with_capacity(total))
        .collect();
    let frame_count = frames.len();
    for frame in frames {
        for (out, samples) in channels.iter_mut().zip(frame.into_channels()) {
            out.extend_from_slice(&samples);
        }
    }

    debug!(
        "Spliced {} frames into {} samples x {} channels",
        frame_count, total, expected_channels
    );
    Ok(SplicedAudio::new(AudioFrame::assemble(expected_rate, channels)))
}
