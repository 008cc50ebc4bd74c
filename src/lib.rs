//! Cache set utilization analysis for hardware simulation runs.
//!
//! Simulator artifacts (text logs and VCD waveforms) are located for every
//! (test, configuration) pair under a results directory, parsed in parallel
//! and aggregated into a [`collect::ResultMatrix`], which [`report`] renders
//! as heatmaps, comparison tables and a Markdown report.

pub mod collect;
pub mod config;
pub mod error;
pub mod geometry;
pub mod locate;
pub mod report;
pub mod stats;
pub mod trace;
pub mod vcd;

pub use collect::{CellResult, Collector, ResultMatrix};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, ArtifactError};
pub use geometry::{AccessEvent, CacheGeometry};
pub use stats::{BlockUsage, ConfigStats, SetUsage, WaveformUsage};
pub use vcd::{SignalEvent, SignalStream, SignalValue, stream_vcd_signals};
