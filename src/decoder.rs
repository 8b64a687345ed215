//! Chunk decoding
//!
//! Each inbound binary message carries one independently decodable chunk.
//! Decoding runs on the blocking pool; [`DecodeQueue`] hands results back in
//! the order the chunks were received, whatever order the decodes finish in.

use crate::audio_frame::AudioFrame;
use crate::error::DecodeError;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Turns one opaque chunk into a freshly allocated [`AudioFrame`].
pub trait ChunkDecoder: Send + Sync + 'static {
    fn decode(&self, chunk: &[u8]) -> Result<AudioFrame, DecodeError>;
}

/// Wire format of inbound audio chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFormat {
    /// Each chunk is a complete RIFF/WAVE file
    Wav,
    /// Headerless little-endian 16-bit PCM
    Pcm16 { sample_rate: u32, channels: u16 },
}

impl ChunkFormat {
    pub fn decoder(self) -> Arc<dyn ChunkDecoder> {
        match self {
            ChunkFormat::Wav => Arc::new(WavDecoder),
            ChunkFormat::Pcm16 { sample_rate, channels } => {
                Arc::new(Pcm16Decoder { sample_rate, channels })
            }
        }
    }
}

/// Decodes WAV chunks of any integer bit depth or 32-bit float.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl ChunkDecoder for WavDecoder {
    fn decode(&self, chunk: &[u8]) -> Result<AudioFrame, DecodeError> {
        if chunk.is_empty() {
            return Err(DecodeError::Empty);
        }
        let reader = hound::WavReader::new(Cursor::new(chunk))
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| DecodeError::Malformed(e.to_string()))?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(DecodeError::Malformed(format!(
                        "unsupported bit depth {}",
                        spec.bits_per_sample
                    )));
                }
                let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?
            }
        };

        AudioFrame::from_interleaved(spec.sample_rate, usize::from(spec.channels), &interleaved)
    }
}

/// Decodes headerless 16-bit PCM with a fixed, configured layout.
#[derive(Debug, Clone, Copy)]
pub struct Pcm16Decoder {
    pub sample_rate: u32,
    pub channels: u16,
}

impl ChunkDecoder for Pcm16Decoder {
    fn decode(&self, chunk: &[u8]) -> Result<AudioFrame, DecodeError> {
        if chunk.is_empty() {
            return Err(DecodeError::Empty);
        }
        if chunk.len() % 2 != 0 {
            return Err(DecodeError::Malformed(format!(
                "{} bytes is not a whole number of 16-bit samples",
                chunk.len()
            )));
        }
        let interleaved: Vec<f32> = chunk
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0)
            .collect();
        AudioFrame::from_interleaved(self.sample_rate, usize::from(self.channels), &interleaved)
    }
}

/// In-flight decodes, oldest first.
pub struct DecodeQueue {
    decoder: Arc<dyn ChunkDecoder>,
    pending: VecDeque<JoinHandle<Result<AudioFrame, DecodeError>>>,
    next_seq: u64,
}

impl DecodeQueue {
    pub fn new(decoder: Arc<dyn ChunkDecoder>) -> Self {
        Self {
            decoder,
            pending: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Start decoding a chunk. The caller may drop `chunk` immediately.
    pub fn push(&mut self, chunk: Vec<u8>) {
        let decoder = self.decoder.clone();
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!("Decoding chunk #{} ({} bytes)", seq, chunk.len());
        self.pending
            .push_back(tokio::task::spawn_blocking(move || decoder.decode(&chunk)));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Result of the oldest chunk, waiting for it if needed. `None` when idle.
    ///
    /// Cancel safe: dropping the future leaves the oldest decode queued.
    pub async fn next(&mut self) -> Option<Result<AudioFrame, DecodeError>> {
        let head = self.pending.front_mut()?;
        let joined = head.await;
        self.pending.pop_front();
        Some(match joined {
            Ok(result) => result,
            Err(e) => Err(DecodeError::TaskFailed(e.to_string())),
        })
    }

    /// Wait for every queued decode, in receipt order.
    pub async fn drain(&mut self) -> Vec<Result<AudioFrame, DecodeError>> {
        let mut results = Vec::with_capacity(self.pending.len());
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    /// Drop every in-flight decode. Returns how many were discarded.
    pub fn abort_all(&mut self) -> usize {
        let n = self.pending.len();
        for handle in self.pending.drain(..) {
            handle.abort();
        }
        n
    }
}

impl Drop for DecodeQueue {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// Encode interleaved i16 samples as an in-memory WAV file.
    pub(crate) fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_wav_mono() {
        let bytes = wav_bytes(&[0, 16_384, -16_384, i16::MIN], 1, 24_000);
        let frame = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(frame.sample_rate(), 24_000);
        assert_eq!(frame.channel_count(), 1);
        assert_eq!(frame.channel(0).unwrap(), &[0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn test_wav_stereo_deinterleaves() {
        let bytes = wav_bytes(&[100, -100, 200, -200], 2, 48_000);
        let frame = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(frame.channel_count(), 2);
        assert_eq!(frame.len(), 2);
        assert!(frame.channel(0).unwrap().iter().all(|s| *s > 0.0));
        assert!(frame.channel(1).unwrap().iter().all(|s| *s < 0.0));
    }

    #[test]
    fn test_wav_float() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.25f32).unwrap();
            writer.write_sample(-0.75f32).unwrap();
            writer.finalize().unwrap();
        }
        let frame = WavDecoder.decode(&cursor.into_inner()).unwrap();
        assert_eq!(frame.channel(0).unwrap(), &[0.25, -0.75]);
    }

    #[test]
    fn test_malformed_and_empty_chunks() {
        assert_eq!(WavDecoder.decode(&[]), Err(DecodeError::Empty));
        assert!(matches!(
            WavDecoder.decode(b"definitely not a wav file"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_pcm16() {
        let decoder = Pcm16Decoder { sample_rate: 24_000, channels: 1 };
        let mut bytes = Vec::new();
        for s in [0i16, 16_384, -32_768] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let frame = decoder.decode(&bytes).unwrap();
        assert_eq!(frame.channel(0).unwrap(), &[0.0, 0.5, -1.0]);

        assert!(matches!(decoder.decode(&[1, 2, 3]), Err(DecodeError::Malformed(_))));
        let stereo = Pcm16Decoder { sample_rate: 24_000, channels: 2 };
        assert!(matches!(stereo.decode(&[0, 0]), Err(DecodeError::InvalidLayout(_))));
    }

    /// Decodes the first byte as a sample count and sleeps longer for
    /// earlier chunks, so completions arrive in reverse.
    struct SlowFirstDecoder;

    impl ChunkDecoder for SlowFirstDecoder {
        fn decode(&self, chunk: &[u8]) -> Result<AudioFrame, DecodeError> {
            let tag = chunk[0];
            if tag == 0 {
                return Err(DecodeError::Malformed("tag 0".to_string()));
            }
            std::thread::sleep(Duration::from_millis(u64::from(chunk[1])));
            AudioFrame::from_interleaved(8_000, 1, &vec![f32::from(tag); usize::from(tag)])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_follow_receipt_order() {
        let mut queue = DecodeQueue::new(Arc::new(SlowFirstDecoder));
        queue.push(vec![3, 60]);
        queue.push(vec![0, 0]);
        queue.push(vec![2, 30]);
        queue.push(vec![1, 0]);
        assert_eq!(queue.len(), 4);

        let results = queue.drain().await;
        assert!(queue.is_empty());
        let lens: Vec<Option<usize>> = results.iter().map(|r| r.as_ref().ok().map(|f| f.len())).collect();
        assert_eq!(lens, vec![Some(3), None, Some(2), Some(1)]);
    }

    #[tokio::test]
    async fn test_next_on_idle_queue() {
        let mut queue = DecodeQueue::new(Arc::new(WavDecoder));
        assert!(queue.next().await.is_none());
        assert_eq!(queue.abort_all(), 0);
    }
}
