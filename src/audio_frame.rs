//! Decoded audio frames and spliced turn audio

use crate::error::DecodeError;
use smallvec::SmallVec;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Per-channel sample arrays. Mono and stereo stay inline.
pub type ChannelSamples = SmallVec<[Vec<f32>; 2]>;

/// One decoded unit of audio: one sample array per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    sample_rate: u32,
    channels: ChannelSamples,
}

impl AudioFrame {
    /// Build a frame, checking the layout invariants.
    pub fn new(sample_rate: u32, channels: ChannelSamples) -> Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::InvalidLayout("sample rate is zero".to_string()));
        }
        let Some(first) = channels.first() else {
            return Err(DecodeError::InvalidLayout("no channels".to_string()));
        };
        let len = first.len();
        if let Some(bad) = channels.iter().position(|c| c.len() != len) {
            return Err(DecodeError::InvalidLayout(format!(
                "channel {} has {} samples, channel 0 has {}",
                bad,
                channels[bad].len(),
                len
            )));
        }
        Ok(Self { sample_rate, channels })
    }

    /// Split interleaved samples into per-channel arrays.
    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        interleaved: &[f32],
    ) -> Result<Self, DecodeError> {
        if channel_count == 0 {
            return Err(DecodeError::InvalidLayout("no channels".to_string()));
        }
        if interleaved.len() % channel_count != 0 {
            return Err(DecodeError::InvalidLayout(format!(
                "{} samples do not divide into {} channels",
                interleaved.len(),
                channel_count
            )));
        }
        let per_channel = interleaved.len() / channel_count;
        let mut channels: ChannelSamples = (0..channel_count)
            .map(|_| Vec::with_capacity(per_channel))
            .collect();
        for block in interleaved.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(block) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len() as f64 / f64::from(self.sample_rate))
    }

    /// Samples interleaved frame by frame, the layout output devices expect.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.len() * self.channel_count());
        for i in 0..self.len() {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Build from channels already known to be well formed.
    pub(crate) fn assemble(sample_rate: u32, channels: ChannelSamples) -> Self {
        debug_assert!(sample_rate > 0 && !channels.is_empty());
        debug_assert!(channels.iter().all(|c| c.len() == channels[0].len()));
        Self { sample_rate, channels }
    }

    pub(crate) fn into_channels(self) -> ChannelSamples {
        self.channels
    }
}

/// The gapless audio of one completed turn. Immutable and cheap to clone, so
/// it can be replayed any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct SplicedAudio(Arc<AudioFrame>);

impl SplicedAudio {
    pub(crate) fn new(frame: AudioFrame) -> Self {
        Self(Arc::new(frame))
    }
}

impl Deref for SplicedAudio {
    type Target = AudioFrame;

    fn deref(&self) -> &AudioFrame {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_rejects_ragged_channels() {
        let err = AudioFrame::new(24_000, smallvec![vec![0.0; 4], vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidLayout(_)));
    }

    #[test]
    fn test_rejects_zero_rate_and_no_channels() {
        assert!(AudioFrame::new(0, smallvec![vec![0.0]]).is_err());
        assert!(AudioFrame::new(16_000, ChannelSamples::new()).is_err());
    }

    #[test]
    fn test_deinterleave() {
        let frame = AudioFrame::from_interleaved(8_000, 2, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]).unwrap();
        assert_eq!(frame.channel_count(), 2);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.channel(0).unwrap(), &[0.1, 0.2, 0.3]);
        assert_eq!(frame.channel(1).unwrap(), &[-0.1, -0.2, -0.3]);
        assert_eq!(frame.interleaved(), vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_odd_interleaved_length() {
        assert!(AudioFrame::from_interleaved(8_000, 2, &[0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_duration() {
        let frame = AudioFrame::new(24_000, smallvec![vec![0.0; 12_000]]).unwrap();
        assert_eq!(frame.duration(), Duration::from_millis(500));
    }
}
