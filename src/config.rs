//! Session configuration

use crate::debounce::DEFAULT_QUIET_PERIOD;
use crate::decoder::ChunkFormat;
use crate::error::ConfigError;
use crate::playback::AudioOutput;
use std::time::Duration;
use url::Url;

/// Sample rate assumed for headerless PCM chunks unless configured otherwise
pub const DEFAULT_PCM_RATE: u32 = 24_000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chat endpoint, without the token
    pub url: String,
    /// Silence after the last chunk that ends a remote audio turn
    pub quiet_period: Duration,
    /// Initial state of the audio toggle
    pub audio_enabled: bool,
    pub chunk_format: ChunkFormat,
    pub output: AudioOutput,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            quiet_period: DEFAULT_QUIET_PERIOD,
            audio_enabled: true,
            chunk_format: ChunkFormat::Wav,
            output: AudioOutput::default(),
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `WAVECHAT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("WAVECHAT_URL") {
            config.url = url;
        }
        if let Some(ms) = lookup("WAVECHAT_QUIET_MS") {
            let ms: u64 = parse(&ms, "WAVECHAT_QUIET_MS")?;
            if ms == 0 {
                return Err(invalid("WAVECHAT_QUIET_MS", "must be greater than zero"));
            }
            config.quiet_period = Duration::from_millis(ms);
        }
        if let Some(audio) = lookup("WAVECHAT_AUDIO") {
            config.audio_enabled = match audio.trim() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                other => return Err(invalid("WAVECHAT_AUDIO", &format!("{:?} is not on/off", other))),
            };
        }
        if let Some(format) = lookup("WAVECHAT_CHUNK_FORMAT") {
            config.chunk_format = match format.trim() {
                "wav" => ChunkFormat::Wav,
                "pcm16" => {
                    let sample_rate = match lookup("WAVECHAT_PCM_RATE") {
                        Some(v) => parse(&v, "WAVECHAT_PCM_RATE")?,
                        None => DEFAULT_PCM_RATE,
                    };
                    let channels = match lookup("WAVECHAT_PCM_CHANNELS") {
                        Some(v) => parse(&v, "WAVECHAT_PCM_CHANNELS")?,
                        None => 1,
                    };
                    if sample_rate == 0 || channels == 0 {
                        return Err(invalid("WAVECHAT_PCM_RATE", "rate and channels must be non-zero"));
                    }
                    ChunkFormat::Pcm16 { sample_rate, channels }
                }
                other => {
                    return Err(invalid(
                        "WAVECHAT_CHUNK_FORMAT",
                        &format!("{:?} is not wav or pcm16", other),
                    ))
                }
            };
        }
        if let Some(output) = lookup("WAVECHAT_OUTPUT") {
            config.output = output
                .parse()
                .map_err(|reason: String| invalid("WAVECHAT_OUTPUT", &reason))?;
        }

        config.base_url()?;
        Ok(config)
    }

    /// The configured endpoint, checked to be a websocket URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::Scheme(other.to_string())),
        }
    }

    /// The endpoint with the bearer token attached as a query parameter.
    pub fn endpoint(&self, token: &str) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

fn parse<T: std::str::FromStr>(value: &str, var: &'static str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(var, &e.to_string()))
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        reason: reason.to_string(),
    }
}
