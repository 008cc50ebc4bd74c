use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    geometry::AccessEvent,
    trace::LogSummary,
    vcd::{SignalEvent, SignalValue, VcdDiagnostics, count_asserted, name_matches},
};

/// Access count per cache set. Sets that were never touched have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetUsage {
    counts: BTreeMap<usize, u64>,
}

impl SetUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: impl IntoIterator<Item = AccessEvent>) -> Self {
        let mut usage = Self::new();
        for event in events {
            usage.record(&event);
        }
        usage
    }

    pub fn record(&mut self, event: &AccessEvent) {
        self.record_set(event.set_index);
    }

    pub fn record_set(&mut self, set_index: usize) {
        *self.counts.entry(set_index).or_insert(0) += 1;
    }

    pub fn get(&self, set_index: usize) -> u64 {
        self.counts.get(&set_index).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn touched_sets(&self) -> usize {
        self.counts.values().filter(|&&c| c > 0).count()
    }

    pub fn max(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts.iter().map(|(&set, &count)| (set, count))
    }
}

/// Access count per (set, way) block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUsage {
    counts: BTreeMap<(usize, usize), u64>,
}

impl BlockUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, set_index: usize, way: usize) {
        *self.counts.entry((set_index, way)).or_insert(0) += 1;
    }

    pub fn get(&self, set_index: usize, way: usize) -> u64 {
        self.counts.get(&(set_index, way)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn max(&self) -> u64 {
        self.counts.values().copied().max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Set and block activity read from a waveform: a set-index signal plus a
/// one-hot hit vector with one bit per way. Every asserted way bit counts
/// as one access to the set index current at that record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveformUsage {
    pub sets: SetUsage,
    pub blocks: BlockUsage,
    /// Hit records whose index was unknown or outside the geometry.
    pub dropped: usize,
}

impl WaveformUsage {
    pub fn from_events(
        events: impl IntoIterator<Item = SignalEvent>,
        index_signal: &str,
        hit_vector: &str,
        num_sets: usize,
    ) -> Self {
        let mut usage = Self::default();
        let mut index: Option<u64> = None;
        for event in events {
            if name_matches(&event.signal_name, index_signal) {
                index = event.value.as_integer();
            } else if name_matches(&event.signal_name, hit_vector) {
                let Some(ways) = event.value.as_integer().filter(|&v| v != 0) else {
                    continue;
                };
                let set = match index {
                    Some(set) if (set as usize) < num_sets => set as usize,
                    _ => {
                        trace!("hit at {} without a usable set index", event.timestamp);
                        usage.dropped += 1;
                        continue;
                    }
                };
                for way in (0..64).filter(|way| ways & (1 << way) != 0) {
                    usage.sets.record_set(set);
                    usage.blocks.record(set, way);
                }
            }
        }
        usage
    }
}

/// Per-cell statistics. `None` means the artifact did not report the value,
/// which is distinct from a measured zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStats {
    pub cycles: Option<u64>,
    pub hits: Option<u64>,
    pub misses: Option<u64>,
    /// Percentage in `[0, 100]`.
    pub hit_ratio: Option<f64>,
    pub mode_switches: Option<u64>,
    pub set_assoc_hits: Option<u64>,
    pub full_assoc_hits: Option<u64>,
    pub set_assoc_time: Option<u64>,
    pub full_assoc_time: Option<u64>,
}

impl ConfigStats {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// True when any of the hybrid-mode counters was measured.
    pub fn has_hybrid_fields(&self) -> bool {
        [
            self.mode_switches,
            self.set_assoc_hits,
            self.full_assoc_hits,
            self.set_assoc_time,
            self.full_assoc_time,
        ]
        .iter()
        .any(Option::is_some)
    }
}

pub fn hit_ratio(hits: Option<u64>, misses: Option<u64>) -> Option<f64> {
    let (hits, misses) = (hits?, misses?);
    let total = hits + misses;
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64 * 100.0)
    }
}

/// Folds log summaries and waveform signals into a [`ConfigStats`]. Log
/// values take precedence; signals only fill fields that are still unknown.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    stats: ConfigStats,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_summary(&mut self, summary: &LogSummary) {
        let s = &mut self.stats;
        s.cycles = s.cycles.or(summary.cycles);
        s.hits = s.hits.or(summary.hits);
        s.misses = s.misses.or(summary.misses);
        s.set_assoc_hits = s.set_assoc_hits.or(summary.set_assoc_hits);
        s.full_assoc_hits = s.full_assoc_hits.or(summary.full_assoc_hits);
        s.mode_switches = s.mode_switches.or(summary.mode_switches);
        s.set_assoc_time = s.set_assoc_time.or(summary.set_assoc_time);
        s.full_assoc_time = s.full_assoc_time.or(summary.full_assoc_time);
    }

    /// Counts asserted records of a hit signal. Only call this for a signal
    /// that is declared in the waveform.
    pub fn fold_hit_signal(&mut self, events: impl IntoIterator<Item = SignalEvent>) {
        if self.stats.hits.is_none() {
            self.stats.hits = Some(count_asserted(events));
        }
    }

    pub fn fold_miss_signal(&mut self, events: impl IntoIterator<Item = SignalEvent>) {
        if self.stats.misses.is_none() {
            self.stats.misses = Some(count_asserted(events));
        }
    }

    /// Mode signal: `0` is set-associative, any other value fully
    /// associative. Time is measured between consecutive records.
    pub fn fold_mode_signal(&mut self, events: impl IntoIterator<Item = SignalEvent>) {
        let mut switches = 0;
        let mut set_time = 0;
        let mut full_time = 0;
        let mut prev: Option<(u64, SignalValue)> = None;
        for event in events {
            if let Some((since, value)) = &prev {
                if *value != event.value {
                    switches += 1;
                }
                let span = event.timestamp.saturating_sub(*since);
                match value.as_integer() {
                    Some(0) => set_time += span,
                    Some(_) => full_time += span,
                    None => {}
                }
            }
            prev = Some((event.timestamp, event.value));
        }
        let s = &mut self.stats;
        s.mode_switches = s.mode_switches.or(Some(switches));
        s.set_assoc_time = s.set_assoc_time.or(Some(set_time));
        s.full_assoc_time = s.full_assoc_time.or(Some(full_time));
    }

    pub fn finish(self) -> ConfigStats {
        let mut stats = self.stats;
        stats.hit_ratio = hit_ratio(stats.hits, stats.misses);
        stats
    }
}

/// Everything the parsers skipped for one cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseDiagnostics {
    pub skipped_tokens: usize,
    pub unknown_ids: usize,
    pub malformed_records: usize,
    pub io_errors: usize,
}

impl ParseDiagnostics {
    pub fn absorb(&mut self, vcd: VcdDiagnostics) {
        self.unknown_ids += vcd.unknown_ids;
        self.malformed_records += vcd.malformed_records;
        self.io_errors += vcd.io_errors;
    }

    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}
