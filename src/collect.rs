//! Parallel collection of per-cell statistics.
//!
//! A cell is one (test, configuration) pair. Cells are independent, so each
//! worker analyzes a cell on its own and hands back an owned [`CellResult`];
//! only the calling thread writes into the [`ResultMatrix`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    config::{AnalysisConfig, ArtifactTemplates, SignalNames},
    error::{AnalysisError, ArtifactError},
    geometry::CacheGeometry,
    locate::resolve_artifact,
    stats::{BlockUsage, ConfigStats, ParseDiagnostics, SetUsage, StatsAggregator, WaveformUsage},
    trace::LogFile,
    vcd::SignalStream,
};

#[derive(Debug, Clone)]
pub struct CellResult {
    pub test: String,
    pub config: String,
    pub log: Option<PathBuf>,
    pub waveform: Option<PathBuf>,
    pub stats: ConfigStats,
    pub usage: SetUsage,
    /// Per-way activity, only known from waveforms.
    pub blocks: BlockUsage,
    pub diagnostics: ParseDiagnostics,
}

impl CellResult {
    pub fn no_data(test: &str, config: &str) -> Self {
        Self {
            test: test.to_string(),
            config: config.to_string(),
            log: None,
            waveform: None,
            stats: ConfigStats::unknown(),
            usage: SetUsage::new(),
            blocks: BlockUsage::new(),
            diagnostics: ParseDiagnostics::default(),
        }
    }

    /// True when at least one artifact was found for the cell.
    pub fn has_data(&self) -> bool {
        self.log.is_some() || self.waveform.is_some()
    }
}

/// Results of one run, indexed by test and configuration. Both axes keep
/// the order they were requested in, and every pair has an entry.
#[derive(Debug, Clone)]
pub struct ResultMatrix {
    tests: Vec<String>,
    configs: Vec<String>,
    geometry: CacheGeometry,
    cells: HashMap<(String, String), CellResult>,
}

impl ResultMatrix {
    pub fn new(tests: &[String], configs: &[String], geometry: CacheGeometry) -> Self {
        Self {
            tests: tests.to_vec(),
            configs: configs.to_vec(),
            geometry,
            cells: HashMap::new(),
        }
    }

    fn insert(&mut self, cell: CellResult) {
        self.cells
            .insert((cell.test.clone(), cell.config.clone()), cell);
    }

    pub fn tests(&self) -> &[String] {
        &self.tests
    }

    pub fn configs(&self) -> &[String] {
        &self.configs
    }

    pub fn geometry(&self) -> CacheGeometry {
        self.geometry
    }

    pub fn get(&self, test: &str, config: &str) -> Option<&CellResult> {
        self.cells.get(&(test.to_string(), config.to_string()))
    }

    /// Cells of `test` in configuration order.
    pub fn row<'a>(&'a self, test: &'a str) -> impl Iterator<Item = &'a CellResult> + 'a {
        self.configs.iter().filter_map(move |config| self.get(test, config))
    }
}

#[derive(Debug, Clone)]
pub struct Collector {
    root: PathBuf,
    geometry: CacheGeometry,
    templates: ArtifactTemplates,
    signals: SignalNames,
    jobs: usize,
    verbose: bool,
}

impl Collector {
    pub fn new(root: impl Into<PathBuf>, config: &AnalysisConfig) -> Self {
        Self {
            root: root.into(),
            geometry: config.geometry,
            templates: config.artifacts.clone(),
            signals: config.signals.clone(),
            jobs: config.worker_count(),
            verbose: false,
        }
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Report progress for every cell at `info` level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn collect(&self, tests: &[String], configs: &[String]) -> Result<ResultMatrix, AnalysisError> {
        if !self.root.exists() {
            return Err(AnalysisError::ResultsDirMissing(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(AnalysisError::NotADirectory(self.root.clone()));
        }
        self.geometry.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("collect-{i}"))
            .build()?;

        let cells: Vec<(&str, &str)> = tests
            .iter()
            .flat_map(|test| configs.iter().map(move |config| (test.as_str(), config.as_str())))
            .collect();
        debug!("collecting {} cells on {} workers", cells.len(), self.jobs);

        let results: Vec<CellResult> = pool.install(|| {
            cells
                .par_iter()
                .map(|&(test, config)| self.analyze_cell(test, config))
                .collect()
        });

        let mut matrix = ResultMatrix::new(tests, configs, self.geometry);
        for cell in results {
            matrix.insert(cell);
        }
        Ok(matrix)
    }

    /// Locates and parses the artifacts of one cell. Never fails: any
    /// problem turns the cell into "no data".
    pub fn analyze_cell(&self, test: &str, config: &str) -> CellResult {
        match self.parse_cell(test, config) {
            Ok(cell) => {
                if !cell.has_data() {
                    if self.verbose {
                        warn!("no artifacts found for {test} / {config}");
                    } else {
                        debug!("no artifacts found for {test} / {config}");
                    }
                } else if !cell.diagnostics.is_clean() {
                    debug!("{test} / {config}: skipped {:?}", cell.diagnostics);
                }
                cell
            }
            Err(e) => {
                warn!("{test} / {config}: {e}");
                CellResult::no_data(test, config)
            }
        }
    }

    fn parse_cell(&self, test: &str, config: &str) -> Result<CellResult, ArtifactError> {
        let mut cell = CellResult::no_data(test, config);
        cell.log = resolve_artifact(&self.root, &self.templates.logs, test, config);
        cell.waveform = resolve_artifact(&self.root, &self.templates.waveforms, test, config);

        let mut aggregator = StatsAggregator::new();

        if let Some(path) = cell.log.clone() {
            if self.verbose {
                info!("parsing log for {test} / {config}: {}", path.display());
            }
            let log = LogFile::load(&path)?;
            if log.is_missing() {
                cell.log = None;
            } else {
                let mut events = log.access_events(self.geometry);
                for event in events.by_ref() {
                    cell.usage.record(&event);
                }
                cell.diagnostics.skipped_tokens += events.skipped();
                aggregator.fold_summary(&log.summary());
            }
        }

        if let Some(path) = cell.waveform.clone() {
            if self.verbose {
                info!("parsing waveform for {test} / {config}: {}", path.display());
            }
            let diagnostics = &mut cell.diagnostics;
            if let Some(name) = &self.signals.hit {
                fold_signal(&path, name, diagnostics, |s| aggregator.fold_hit_signal(s))?;
            }
            if let Some(name) = &self.signals.miss {
                fold_signal(&path, name, diagnostics, |s| aggregator.fold_miss_signal(s))?;
            }
            if let Some(name) = &self.signals.mode {
                fold_signal(&path, name, diagnostics, |s| aggregator.fold_mode_signal(s))?;
            }
            if let (Some(index), Some(hits)) = (&self.signals.set_index, &self.signals.hit_vector) {
                let mut stream = SignalStream::open_all(&path, &[index.as_str(), hits.as_str()])?;
                if stream.declares(index) && stream.declares(hits) {
                    let num_sets = self.geometry.num_sets;
                    let waveform = WaveformUsage::from_events(&mut stream, index, hits, num_sets);
                    if waveform.dropped > 0 {
                        debug!("{test} / {config}: {} hits without a set index", waveform.dropped);
                    }
                    // addresses from the log take precedence
                    if cell.usage.is_empty() {
                        cell.usage = waveform.sets;
                    }
                    cell.blocks = waveform.blocks;
                }
                cell.diagnostics.absorb(stream.diagnostics());
            }
        }

        cell.stats = aggregator.finish();
        Ok(cell)
    }
}

/// Streams `signal` from the waveform at `path` into `fold`, if the
/// waveform declares it. Each call re-reads the file.
fn fold_signal(
    path: &Path,
    signal: &str,
    diagnostics: &mut ParseDiagnostics,
    fold: impl FnOnce(&mut SignalStream),
) -> Result<(), ArtifactError> {
    let mut stream = SignalStream::open(path, signal)?;
    if stream.is_declared() {
        fold(&mut stream);
    }
    diagnostics.absorb(stream.diagnostics());
    Ok(())
}
