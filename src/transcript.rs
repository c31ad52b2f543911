//! Transcript entries and the deduplicated transcript buffer.
//!
//! An entry is either *interim* (provisional, overwritten in place as more
//! text arrives, at most one live per speaker) or *final* (immutable once
//! appended). Finalizing an entry for a speaker removes that speaker's
//! outstanding interim entry. These rules live entirely in
//! [`TranscriptBuffer`].

use std::time::Instant;

/// One speaker-labeled transcript segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionEntry {
    pub id: String,
    pub timestamp: Instant,
    pub speaker: String,
    pub speaker_id: String,
    pub text: String,
    /// Recognizer confidence in [0, 1].
    pub confidence: f32,
    /// Audio level at the moment the result arrived.
    pub audio_level: f32,
    pub is_final: bool,
}

/// Ordered transcript buffer with interim/final deduplication.
///
/// Insertion order is significant and preserved. The orchestrator is the
/// sole writer; consumers only ever see snapshot clones.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    entries: Vec<TranscriptionEntry>,
    next_id: u64,
}

/// Payload for inserting or updating an entry.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub timestamp: Instant,
    pub speaker: String,
    pub speaker_id: String,
    pub text: String,
    pub confidence: f32,
    pub audio_level: f32,
}

impl TranscriptBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("entry_{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts or updates the interim entry for the draft's speaker.
    ///
    /// If a live interim entry for the speaker exists it is overwritten in
    /// place (keeping its position and id); otherwise a new interim entry
    /// is appended.
    pub fn upsert_interim(&mut self, draft: EntryDraft) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| !e.is_final && e.speaker_id == draft.speaker_id)
        {
            existing.text = draft.text;
            existing.confidence = draft.confidence.clamp(0.0, 1.0);
            existing.audio_level = draft.audio_level.clamp(0.0, 1.0);
            existing.timestamp = draft.timestamp;
            return;
        }

        let id = self.allocate_id();
        self.entries.push(TranscriptionEntry {
            id,
            timestamp: draft.timestamp,
            speaker: draft.speaker,
            speaker_id: draft.speaker_id,
            text: draft.text,
            confidence: draft.confidence.clamp(0.0, 1.0),
            audio_level: draft.audio_level.clamp(0.0, 1.0),
            is_final: false,
        });
    }

    /// Appends a final entry for the draft's speaker, removing that
    /// speaker's outstanding interim entry.
    pub fn push_final(&mut self, draft: EntryDraft) {
        self.entries
            .retain(|e| e.is_final || e.speaker_id != draft.speaker_id);

        let id = self.allocate_id();
        self.entries.push(TranscriptionEntry {
            id,
            timestamp: draft.timestamp,
            speaker: draft.speaker,
            speaker_id: draft.speaker_id,
            text: draft.text,
            confidence: draft.confidence.clamp(0.0, 1.0),
            audio_level: draft.audio_level.clamp(0.0, 1.0),
            is_final: true,
        });
    }

    /// Snapshot of the whole buffer (interim and final) in insertion order.
    pub fn snapshot(&self) -> Vec<TranscriptionEntry> {
        self.entries.clone()
    }

    /// Final entries only, in insertion order.
    ///
    /// This is the externally visible transcript history: append-only and
    /// prefix-stable across calls within a session.
    pub fn finals(&self) -> Vec<TranscriptionEntry> {
        self.entries.iter().filter(|e| e.is_final).cloned().collect()
    }

    /// Number of entries, interim included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
