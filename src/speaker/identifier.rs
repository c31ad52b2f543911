//! Speaker identification from audio activity.
//!
//! Maps an instantaneous `(audio level, timestamp)` pair to a speaker
//! identity, using the name-candidate registry as an oracle when it has
//! data and a generic fallback identity when it does not. Silence never
//! switches speakers; switching on timing alone is cooldown-gated to keep
//! audio jitter from splitting one utterance across two speakers.

use crate::defaults;
use crate::speaker::registry::{NameCandidateRegistry, SpeakerCandidate};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The currently assigned speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerIdentity {
    pub id: String,
    pub name: String,
}

impl SpeakerIdentity {
    fn from_candidate(candidate: &SpeakerCandidate) -> Self {
        Self {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
        }
    }

    fn generic() -> Self {
        // Distinct id namespace: the registry allocates speaker_N, so a
        // later first candidate must not alias the fallback identity
        Self {
            id: "generic_1".to_string(),
            name: "Speaker 1".to_string(),
        }
    }
}

/// One entry of the speaker-activity history.
#[derive(Debug, Clone)]
pub struct SpeakerActivityRecord {
    pub speaker_id: String,
    pub speaker_name: String,
    pub timestamp: Instant,
    pub audio_level: f32,
    /// Time since the previous record, for any speaker.
    pub duration: Duration,
}

/// Aggregated per-speaker statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerStats {
    pub total_speaking_time: Duration,
    pub segments: usize,
    pub avg_audio_level: f32,
    pub last_seen: Instant,
}

/// Maps audio activity to speaker identities.
pub struct SpeakerIdentifier {
    registry: NameCandidateRegistry,
    current: Option<SpeakerIdentity>,
    last_speaking: Option<Instant>,
    speaking_threshold: f32,
    switch_cooldown: Duration,
    history: Vec<SpeakerActivityRecord>,
}

impl SpeakerIdentifier {
    /// Creates an identifier over the given registry with default tuning.
    pub fn new(registry: NameCandidateRegistry) -> Self {
        Self {
            registry,
            current: None,
            last_speaking: None,
            speaking_threshold: defaults::SPEAKING_THRESHOLD,
            switch_cooldown: Duration::from_millis(defaults::SWITCH_COOLDOWN_MS),
            history: Vec::new(),
        }
    }

    /// Returns the current best speaker for the given audio level.
    ///
    /// Silence (level at or below the speaking threshold) always returns
    /// the current identity unchanged. Returns `None` only before any
    /// speech activity has been observed.
    pub fn identify(&mut self, level: f32, now: Instant) -> Option<SpeakerIdentity> {
        let level = level.clamp(0.0, 1.0);
        let candidates = self.registry.candidates();

        // Generic mode: no names known, fall back to a single identity so
        // attribution never blocks on name discovery
        if candidates.is_empty() {
            if level > self.speaking_threshold {
                if self.current.is_none() {
                    self.current = Some(SpeakerIdentity::generic());
                }
                self.record_activity(level, now);
                self.last_speaking = Some(now);
            }
            return self.current.clone();
        }

        // Silence must not cause speaker flapping
        if level <= self.speaking_threshold {
            return self.current.clone();
        }

        // Visual cross-check wins over timing heuristics
        let highlighted = self
            .registry
            .current_highlighted()
            .filter(|h| !h.name.trim().is_empty())
            .filter(|h| candidates.iter().any(|c| c.id == h.id));

        if let Some(highlighted) = highlighted {
            self.current = Some(SpeakerIdentity::from_candidate(&highlighted));
        } else if self.current.is_none() || self.cooldown_elapsed(now) {
            let next = self.next_round_robin(&candidates);
            self.current = Some(SpeakerIdentity::from_candidate(next));
        }

        self.record_activity(level, now);
        self.last_speaking = Some(now);
        self.current.clone()
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_speaking {
            Some(last) => now.saturating_duration_since(last) > self.switch_cooldown,
            None => true,
        }
    }

    /// Round-robin selection: prefer a candidate absent from the recent
    /// activity window; fall back to the first candidate.
    fn next_round_robin<'a>(&self, candidates: &'a [SpeakerCandidate]) -> &'a SpeakerCandidate {
        let recent: Vec<&str> = self
            .history
            .iter()
            .rev()
            .take(defaults::RECENT_SPEAKER_WINDOW)
            .map(|r| r.speaker_id.as_str())
            .collect();

        candidates
            .iter()
            .find(|c| !recent.contains(&c.id.as_str()))
            .unwrap_or(&candidates[0])
    }

    /// Appends an activity record when the speaker changed or enough time
    /// passed since the previous record for the same speaker.
    fn record_activity(&mut self, level: f32, now: Instant) {
        let current = match &self.current {
            Some(current) => current.clone(),
            None => return,
        };

        let should_record = match self.history.last() {
            None => true,
            Some(last) => {
                last.speaker_id != current.id
                    || now.saturating_duration_since(last.timestamp)
                        > Duration::from_millis(defaults::ACTIVITY_GAP_MS)
            }
        };
        if !should_record {
            return;
        }

        let duration = self
            .history
            .last()
            .map(|last| now.saturating_duration_since(last.timestamp))
            .unwrap_or(Duration::ZERO);

        self.history.push(SpeakerActivityRecord {
            speaker_id: current.id,
            speaker_name: current.name,
            timestamp: now,
            audio_level: level,
            duration,
        });

        if self.history.len() > defaults::ACTIVITY_HISTORY_CAP {
            let excess = self.history.len() - defaults::ACTIVITY_HISTORY_KEEP;
            self.history.drain(..excess);
        }
    }

    /// Sets the speech threshold, clamped to [0, 1].
    pub fn set_speaking_threshold(&mut self, threshold: f32) {
        self.speaking_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Returns the current speech threshold.
    pub fn speaking_threshold(&self) -> f32 {
        self.speaking_threshold
    }

    /// Sets the switch cooldown, floored at the minimum.
    pub fn set_switch_cooldown(&mut self, cooldown: Duration) {
        let floor = Duration::from_millis(defaults::MIN_SWITCH_COOLDOWN_MS);
        self.switch_cooldown = cooldown.max(floor);
    }

    /// Returns the current speaker without updating any state.
    pub fn current_speaker(&self) -> Option<&SpeakerIdentity> {
        self.current.as_ref()
    }

    /// Manually advances to the next registry candidate, bypassing the
    /// cooldown. No-op in generic mode.
    pub fn force_switch(&mut self) {
        let candidates = self.registry.candidates();
        if candidates.is_empty() {
            return;
        }
        let next_index = match &self.current {
            Some(current) => candidates
                .iter()
                .position(|c| c.id == current.id)
                .map(|i| (i + 1) % candidates.len())
                .unwrap_or(0),
            None => 0,
        };
        self.current = Some(SpeakerIdentity::from_candidate(&candidates[next_index]));
        self.last_speaking = None;
    }

    /// Aggregates the activity history into per-speaker statistics.
    pub fn speaker_stats(&self) -> HashMap<String, SpeakerStats> {
        let mut stats: HashMap<String, SpeakerStats> = HashMap::new();
        for record in &self.history {
            let entry = stats
                .entry(record.speaker_name.clone())
                .or_insert(SpeakerStats {
                    total_speaking_time: Duration::ZERO,
                    segments: 0,
                    avg_audio_level: 0.0,
                    last_seen: record.timestamp,
                });
            // Running mean over segments
            entry.avg_audio_level = (entry.avg_audio_level * entry.segments as f32
                + record.audio_level)
                / (entry.segments + 1) as f32;
            entry.segments += 1;
            entry.total_speaking_time += record.duration;
            entry.last_seen = entry.last_seen.max(record.timestamp);
        }
        stats
    }

    /// Read-only view of the activity history, oldest first.
    pub fn activity_history(&self) -> &[SpeakerActivityRecord] {
        &self.history
    }

    /// Clears all identification state. The registry is left untouched.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_speaking = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::report::LogReporter;
    use crate::speaker::registry::NameCandidate;
    use std::sync::Arc;

    fn registry_with(clock: &MockClock, names: &[&str]) -> NameCandidateRegistry {
        let registry = NameCandidateRegistry::with_options(
            Arc::new(clock.clone()),
            Arc::new(LogReporter),
            Duration::from_millis(10),
        );
        let candidates: Vec<NameCandidate> =
            names.iter().map(|n| NameCandidate::new(*n, 0.9)).collect();
        if !candidates.is_empty() {
            registry.ingest(&candidates);
        }
        registry
    }

    #[test]
    fn test_generic_mode_scenario() {
        // Registry empty, levels [0.02, 0.5, 0.5, 0.02] at threshold 0.1
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        assert_eq!(identifier.identify(0.02, clock.now()), None);

        clock.advance(Duration::from_millis(100));
        let second = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(second.name, "Speaker 1");
        assert_eq!(second.id, "generic_1");

        clock.advance(Duration::from_millis(100));
        assert_eq!(identifier.identify(0.5, clock.now()).unwrap().name, "Speaker 1");

        // Silence retains the last speaker
        clock.advance(Duration::from_millis(100));
        assert_eq!(identifier.identify(0.02, clock.now()).unwrap().name, "Speaker 1");
    }

    #[test]
    fn test_generic_id_distinct_from_registry_ids() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry.clone());

        // Generic mode first: fallback identity gets attributed
        let generic = identifier.identify(0.5, clock.now()).unwrap();

        // A name appears later; the registry's first candidate id must
        // not alias the fallback identity
        registry.ingest(&[NameCandidate::new("Alice", 0.9)]);
        clock.advance(Duration::from_secs(3));
        let named = identifier.identify(0.5, clock.now()).unwrap();

        assert_eq!(named.name, "Alice");
        assert_ne!(generic.id, named.id);

        // Both show up in the history as distinct speakers
        let ids: Vec<&str> = identifier
            .activity_history()
            .iter()
            .map(|r| r.speaker_id.as_str())
            .collect();
        assert!(ids.contains(&generic.id.as_str()));
        assert!(ids.contains(&named.id.as_str()));
    }

    #[test]
    fn test_silence_never_switches() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice", "Bob"]);
        let mut identifier = SpeakerIdentifier::new(registry);

        // No speech: no speaker is ever assigned, no matter how long
        for _ in 0..20 {
            clock.advance(Duration::from_secs(5));
            assert_eq!(identifier.identify(0.05, clock.now()), None);
        }
    }

    #[test]
    fn test_highlighted_candidate_overrides_cooldown() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice"]);
        registry.ingest(&[
            NameCandidate::new("Alice", 0.9),
            NameCandidate::new("Bob", 0.9),
        ]);
        let mut identifier = SpeakerIdentifier::new(registry.clone());

        // Bob was the last re-detected candidate, so the visual cross-check
        // adopts him immediately even with zero cooldown elapsed
        let speaker = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(speaker.name, "Bob");

        clock.advance(Duration::from_millis(1));
        let speaker = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(speaker.name, "Bob");
    }

    #[test]
    fn test_cooldown_blocks_timing_based_switch() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice", "Bob"]);
        // Clear the highlight so only the timing heuristic runs
        registry.ingest(&[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        let first = identifier.identify(0.5, clock.now()).unwrap();

        // Within the cooldown the identity must not change
        clock.advance(Duration::from_millis(300));
        assert_eq!(identifier.identify(0.5, clock.now()).unwrap(), first);
        clock.advance(Duration::from_millis(300));
        assert_eq!(identifier.identify(0.5, clock.now()).unwrap(), first);
    }

    #[test]
    fn test_round_robin_rotates_after_cooldown() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice", "Bob"]);
        registry.ingest(&[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        let first = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(first.name, "Alice");

        // After the cooldown, rotation prefers a candidate missing from
        // recent activity
        clock.advance(Duration::from_millis(1500));
        let second = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(second.name, "Bob");
    }

    #[test]
    fn test_round_robin_falls_back_to_first() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice"]);
        registry.ingest(&[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        identifier.identify(0.5, clock.now());
        clock.advance(Duration::from_millis(1500));
        // Alice is in recent history but is the only candidate
        let speaker = identifier.identify(0.5, clock.now()).unwrap();
        assert_eq!(speaker.name, "Alice");
    }

    #[test]
    fn test_activity_history_cap_and_trim() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        // Each sample is 3s apart, so every one produces a record
        for _ in 0..60 {
            identifier.identify(0.5, clock.now());
            clock.advance(Duration::from_secs(3));
        }

        let len = identifier.activity_history().len();
        assert!(len <= defaults::ACTIVITY_HISTORY_CAP);
        // After exceeding the cap the history was trimmed to the keep size
        // and has grown from there
        assert!(len >= defaults::ACTIVITY_HISTORY_KEEP);
    }

    #[test]
    fn test_same_speaker_close_samples_not_duplicated() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        identifier.identify(0.5, clock.now());
        clock.advance(Duration::from_millis(500));
        identifier.identify(0.5, clock.now());
        clock.advance(Duration::from_millis(500));
        identifier.identify(0.5, clock.now());

        // Same speaker within the 2s gap: one record
        assert_eq!(identifier.activity_history().len(), 1);
    }

    #[test]
    fn test_speaker_stats_aggregation() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        identifier.identify(0.4, clock.now());
        clock.advance(Duration::from_secs(3));
        identifier.identify(0.6, clock.now());

        let stats = identifier.speaker_stats();
        let speaker = stats.get("Speaker 1").unwrap();
        assert_eq!(speaker.segments, 2);
        assert!((speaker.avg_audio_level - 0.5).abs() < 1e-6);
        assert_eq!(speaker.total_speaking_time, Duration::from_secs(3));
    }

    #[test]
    fn test_threshold_and_cooldown_clamping() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        identifier.set_speaking_threshold(2.0);
        assert!((identifier.speaking_threshold() - 1.0).abs() < f32::EPSILON);
        identifier.set_speaking_threshold(-0.5);
        assert_eq!(identifier.speaking_threshold(), 0.0);

        identifier.set_switch_cooldown(Duration::from_millis(100));
        assert_eq!(identifier.switch_cooldown, Duration::from_millis(500));
    }

    #[test]
    fn test_force_switch_and_reset() {
        let clock = MockClock::new();
        let registry = registry_with(&clock, &["Alice", "Bob"]);
        registry.ingest(&[]);
        let mut identifier = SpeakerIdentifier::new(registry);

        identifier.identify(0.5, clock.now());
        assert_eq!(identifier.current_speaker().unwrap().name, "Alice");

        identifier.force_switch();
        assert_eq!(identifier.current_speaker().unwrap().name, "Bob");
        identifier.force_switch();
        assert_eq!(identifier.current_speaker().unwrap().name, "Alice");

        identifier.reset();
        assert!(identifier.current_speaker().is_none());
        assert!(identifier.activity_history().is_empty());
    }
}
