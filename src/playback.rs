//! Audio output sinks
//!
//! A sink takes a finished [`SplicedAudio`] and starts playing it right away.
//! No pause or seek. Sinks are opened lazily on the first play and released
//! when the session ends.

use crate::audio_frame::SplicedAudio;
use crate::error::PlaybackError;
use chrono::Local;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub trait AudioSink: Send {
    fn play(&mut self, audio: &SplicedAudio) -> Result<(), PlaybackError>;
}

/// Where played audio goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutput {
    /// Discard
    Null,
    /// Write each played unit as a WAV file under a timestamped directory
    WavDir(PathBuf),
    /// PulseAudio default sink
    #[cfg(feature = "pulse")]
    Pulse { app_name: String },
}

impl Default for AudioOutput {
    fn default() -> Self {
        AudioOutput::WavDir(PathBuf::from("recordings"))
    }
}

impl AudioOutput {
    /// Acquire the output resource. May block.
    pub fn open(&self) -> Result<Box<dyn AudioSink>, PlaybackError> {
        match self {
            AudioOutput::Null => Ok(Box::new(NullSink)),
            AudioOutput::WavDir(base) => Ok(Box::new(WavDirSink::create(base)?)),
            #[cfg(feature = "pulse")]
            AudioOutput::Pulse { app_name } => Ok(Box::new(pulse::PulseSink::new(app_name)?)),
        }
    }
}

impl FromStr for AudioOutput {
    type Err = String;

    /// `null`, `wav:<dir>`, or `pulse` when built with the `pulse` feature.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "null" | "none" => Ok(AudioOutput::Null),
            "wav" => Ok(AudioOutput::default()),
            #[cfg(feature = "pulse")]
            "pulse" => Ok(AudioOutput::Pulse {
                app_name: "wavechat".to_string(),
            }),
            other => match other.strip_prefix("wav:") {
                Some(dir) if !dir.is_empty() => Ok(AudioOutput::WavDir(PathBuf::from(dir))),
                _ => Err(format!("unknown audio output {:?}", other)),
            },
        }
    }
}

pub struct NullSink;

impl AudioSink for NullSink {
    fn play(&mut self, audio: &SplicedAudio) -> Result<(), PlaybackError> {
        debug!("Discarding {} samples of audio", audio.len());
        Ok(())
    }
}

/// Writes every play to `<base>/<YYYYmmdd_HHMMSS>/play_NNN_<HHMMSS.mmm>.wav`.
pub struct WavDirSink {
    dir: PathBuf,
    plays: u32,
}

impl WavDirSink {
    pub fn create(base: &Path) -> Result<Self, PlaybackError> {
        let ts = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = base.join(ts);
        fs::create_dir_all(&dir)?;
        info!("Writing played audio to {:?}", dir);
        Ok(Self { dir, plays: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AudioSink for WavDirSink {
    fn play(&mut self, audio: &SplicedAudio) -> Result<(), PlaybackError> {
        self.plays += 1;
        let path = self.dir.join(format!(
            "play_{:03}_{}.wav",
            self.plays,
            Local::now().format("%H%M%S%.3f")
        ));
        let channels = u16::try_from(audio.channel_count()).map_err(|_| {
            PlaybackError::Device(format!("{} channels do not fit a WAV header", audio.channel_count()))
        })?;
        let spec = hound::WavSpec {
            channels,
            sample_rate: audio.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(BufWriter::new(fs::File::create(&path)?), spec)?;
        for sample in audio.interleaved() {
            writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        }
        writer.finalize()?;
        info!("🔊 Wrote {:.2}s of audio to {:?}", audio.duration().as_secs_f32(), path);
        Ok(())
    }
}

#[cfg(feature = "pulse")]
mod pulse {
    use super::AudioSink;
    use crate::audio_frame::SplicedAudio;
    use crate::error::PlaybackError;
    use libpulse_binding::sample::{Format, Spec};
    use libpulse_binding::stream::Direction;
    use libpulse_simple_binding::Simple;
    use std::sync::mpsc;
    use tracing::{error, info};

    /// Plays on a dedicated thread so blocking writes never stall the session.
    pub struct PulseSink {
        tx: mpsc::Sender<SplicedAudio>,
        _handle: std::thread::JoinHandle<()>,
    }

    impl PulseSink {
        pub fn new(app_name: &str) -> Result<Self, PlaybackError> {
            let (tx, rx) = mpsc::channel::<SplicedAudio>();
            let app_name = app_name.to_string();
            let handle = std::thread::Builder::new()
                .name("pulse-playback".to_string())
                .spawn(move || {
                    // exits once the sink (and its sender) is dropped
                    while let Ok(audio) = rx.recv() {
                        if let Err(e) = play_blocking(&app_name, &audio) {
                            error!("PulseAudio playback failed: {}", e);
                        }
                    }
                    info!("PulseAudio playback thread stopped");
                })?;
            Ok(Self { tx, _handle: handle })
        }
    }

    impl AudioSink for PulseSink {
        fn play(&mut self, audio: &SplicedAudio) -> Result<(), PlaybackError> {
            self.tx
                .send(audio.clone())
                .map_err(|_| PlaybackError::Device("playback thread stopped".to_string()))
        }
    }

    /// Stream parameters for `audio`. PulseAudio takes at most 255 channels.
    pub(super) fn stream_spec(audio: &SplicedAudio) -> Result<Spec, PlaybackError> {
        let channels = u8::try_from(audio.channel_count()).map_err(|_| {
            PlaybackError::Device(format!(
                "{} channels is more than PulseAudio supports",
                audio.channel_count()
            ))
        })?;
        Ok(Spec {
            format: Format::FLOAT32NE,
            channels,
            rate: audio.sample_rate(),
        })
    }

    fn play_blocking(app_name: &str, audio: &SplicedAudio) -> Result<(), PlaybackError> {
        let spec = stream_spec(audio)?;
        let simple = Simple::new(
            None,     // default server
            app_name, // application name
            Direction::Playback,
            None,       // default device
            "playback", // stream description
            &spec,
            None, // default channel map
            None, // default buffering
        )
        .map_err(|e| PlaybackError::Device(e.to_string().unwrap_or_default()))?;

        let samples = audio.interleaved();
        simple
            .write(bytemuck::cast_slice(&samples))
            .map_err(|e| PlaybackError::Device(e.to_string().unwrap_or_default()))?;
        simple
            .drain()
            .map_err(|e| PlaybackError::Device(e.to_string().unwrap_or_default()))?;
        Ok(())
    }
}
