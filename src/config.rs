use std::{
    fs, io,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use serde::Deserialize;

use crate::{error::AnalysisError, geometry::CacheGeometry};

const DEFAULT_TESTS: [&str; 3] = ["hello_world", "cache_test", "cache_thrash"];
const DEFAULT_CONFIGS: [&str; 4] = ["WT", "WT_HYB", "WT_HYB_FORCE_SET_ASS", "WT_HYB_FORCE_FULL_ASS"];

/// Everything a run needs besides the results directory. Every key is
/// optional in the TOML document; missing keys fall back to the defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub tests: Vec<String>,
    pub configs: Vec<String>,
    /// Worker pool size; host parallelism when unset.
    pub jobs: Option<usize>,
    pub geometry: CacheGeometry,
    pub artifacts: ArtifactTemplates,
    pub signals: SignalNames,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tests: DEFAULT_TESTS.map(String::from).to_vec(),
            configs: DEFAULT_CONFIGS.map(String::from).to_vec(),
            jobs: None,
            geometry: CacheGeometry::default(),
            artifacts: ArtifactTemplates::default(),
            signals: SignalNames::default(),
        }
    }
}

/// Path templates relative to `<results>/<config>/`, tried in order.
/// `{test}` and `{config}` are substituted; `*` and `?` match within a
/// single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArtifactTemplates {
    pub logs: Vec<String>,
    pub waveforms: Vec<String>,
}

impl Default for ArtifactTemplates {
    fn default() -> Self {
        Self {
            logs: vec![
                "out_*/veri-testharness_sim/{test}.cv32a60x.log.iss".into(),
                "out_*/veri-testharness_sim/{test}.cv32a60x.log".into(),
                "simulation_artifacts/out_*/veri-testharness_sim/{test}.cv32a60x.log.*".into(),
                "simulation_artifacts/*/{test}.cv32a60x.log.*".into(),
            ],
            waveforms: vec![
                "out_*/veri-testharness_sim/{test}.cv32a60x.vcd".into(),
                "simulation_artifacts/out_*/veri-testharness_sim/{test}.cv32a60x.vcd".into(),
            ],
        }
    }
}

/// Waveform signals folded into the statistics when a log lacks the
/// corresponding summary line. `set_index` and `hit_vector` together give
/// per-set usage for cells whose log holds no addresses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignalNames {
    pub hit: Option<String>,
    pub miss: Option<String>,
    pub mode: Option<String>,
    pub set_index: Option<String>,
    /// One-hot, one bit per way.
    pub hit_vector: Option<String>,
}

impl Default for SignalNames {
    fn default() -> Self {
        Self {
            hit: Some("hit".into()),
            miss: Some("miss".into()),
            mode: None,
            set_index: Some("rd_idx_i".into()),
            hit_vector: Some("rd_hit_oh_o".into()),
        }
    }
}

impl AnalysisConfig {
    /// Loads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AnalysisError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                AnalysisError::ConfigMissing(path.to_path_buf())
            } else {
                AnalysisError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_toml(&text, path)
    }

    pub fn from_toml(text: &str, origin: impl Into<PathBuf>) -> Result<Self, AnalysisError> {
        let config: Self = toml::from_str(text).map_err(|source| AnalysisError::ConfigParse {
            path: origin.into(),
            source,
        })?;
        config.geometry.validate()?;
        Ok(config)
    }

    pub fn worker_count(&self) -> usize {
        self.jobs
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
            .max(1)
    }
}
