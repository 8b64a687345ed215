//! Append-only chat transcript

use crate::audio_frame::SplicedAudio;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Audio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryContent {
    Text(String),
    Audio(SplicedAudio),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub origin: Origin,
    pub content: EntryContent,
    /// Position in the transcript, starting at 0
    pub order: u64,
    pub created_at: DateTime<Local>,
}

impl TranscriptEntry {
    pub fn kind(&self) -> EntryKind {
        match self.content {
            EntryContent::Text(_) => EntryKind::Text,
            EntryContent::Audio(_) => EntryKind::Audio,
        }
    }

    pub fn summary(&self) -> EntrySummary {
        let (text, samples, channels, sample_rate, duration_ms) = match &self.content {
            EntryContent::Text(text) => (Some(text.clone()), None, None, None, None),
            EntryContent::Audio(audio) => (
                None,
                Some(audio.len()),
                Some(audio.channel_count()),
                Some(audio.sample_rate()),
                Some(audio.duration().as_millis() as u64),
            ),
        };
        EntrySummary {
            id: self.id,
            kind: self.kind(),
            origin: self.origin,
            order: self.order,
            created_at: self.created_at.to_rfc3339(),
            text,
            samples,
            channels,
            sample_rate,
            duration_ms,
        }
    }
}

/// Serializable view of an entry, without the sample data.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub kind: EntryKind,
    pub origin: Origin,
    pub order: u64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Ordered log of entries. Entries are never changed or removed.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, origin: Origin, content: EntryContent) -> &TranscriptEntry {
        let entry = TranscriptEntry {
            id: EntryId::next(),
            origin,
            content,
            order: self.entries.len() as u64,
            created_at: Local::now(),
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        // ids are handed out in increasing order, so entries stay sorted by id
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_frame::AudioFrame;
    use smallvec::smallvec;

    #[test]
    fn test_append_assigns_order_and_unique_ids() {
        let mut store = TranscriptStore::new();
        let a = store.append(Origin::Local, EntryContent::Text("hi".into())).id;
        let b = store.append(Origin::Remote, EntryContent::Text("hello".into())).id;
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].order, 0);
        assert_eq!(store.entries()[1].order, 1);
        assert_eq!(store.get(b).unwrap().origin, Origin::Remote);

        let mut other = TranscriptStore::new();
        let c = other.append(Origin::Local, EntryContent::Text("x".into())).id;
        assert!(c != a && c != b);
        assert!(store.get(c).is_none());
    }

    #[test]
    fn test_audio_summary() {
        let audio = SplicedAudio::new(AudioFrame::new(24_000, smallvec![vec![0.0; 2_400]]).unwrap());
        let mut store = TranscriptStore::new();
        let entry = store.append(Origin::Remote, EntryContent::Audio(audio));
        assert_eq!(entry.kind(), EntryKind::Audio);

        let json = serde_json::to_value(entry.summary()).unwrap();
        assert_eq!(json["kind"], "audio");
        assert_eq!(json["origin"], "remote");
        assert_eq!(json["samples"], 2_400);
        assert_eq!(json["duration_ms"], 100);
        assert!(json.get("text").is_none());
    }

    #[test]
    fn test_entry_id_parse() {
        let id: EntryId = " 42 ".parse().unwrap();
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<EntryId>().is_err());
    }
}
