//! Streaming value change dump (VCD) reader.
//!
//! Waveforms from full-system runs easily reach gigabytes. The header is
//! parsed once with [`vcd_ng::Parser`] to resolve identifier codes, then the
//! file is rewound and the body is streamed through [`vcd_ng::FastFlow`].
//! Value changes are produced lazily by the [`Iterator`] impl and cannot be
//! replayed.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use vcd_ng::{FFValueChange, FastFlow, FastFlowToken, IdCode, ScopeItem};

use crate::error::ArtifactError;

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    /// Two-state scalar or vector value.
    Integer(u64),
    /// Anything else: `x`/`z` bits, real numbers, vectors wider than 64 bits.
    Raw(String),
}

impl SignalValue {
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            SignalValue::Integer(v) => Some(*v),
            SignalValue::Raw(_) => None,
        }
    }

    /// True for a non-zero two-state value.
    pub fn is_asserted(&self) -> bool {
        self.as_integer().is_some_and(|v| v != 0)
    }

    fn from_bits(bits: &str) -> Option<Self> {
        if bits.is_empty() {
            return None;
        }
        if bits.len() <= 64 && bits.bytes().all(|b| b == b'0' || b == b'1') {
            return u64::from_str_radix(bits, 2).ok().map(SignalValue::Integer);
        }
        Some(SignalValue::Raw(bits.to_ascii_lowercase()))
    }

    /// Value of one body record as handed out by the flow reader: scalar
    /// bits, a vector with or without its `b` prefix, or an `r` real.
    fn from_record(record: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(record);
        match text.as_bytes().first()? {
            b'b' | b'B' => Self::from_bits(&text[1..]),
            b'r' | b'R' => Some(SignalValue::Raw(text[1..].to_string())),
            _ => Self::from_bits(&text),
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{v}"),
            SignalValue::Raw(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalEvent {
    pub timestamp: u64,
    /// Dotted hierarchical name of the declaration that changed.
    pub signal_name: String,
    pub value: SignalValue,
}

/// Records the reader skipped instead of failing on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VcdDiagnostics {
    /// Value changes for identifiers that were never declared.
    pub unknown_ids: usize,
    pub malformed_records: usize,
    pub io_errors: usize,
}

/// True when `requested` names the declaration `full_name`, either by its
/// dotted hierarchical name or by its last path segment.
pub fn name_matches(full_name: &str, requested: &str) -> bool {
    full_name == requested || full_name.rsplit('.').next() == Some(requested)
}

fn dotted(scope: &[String], reference: &str) -> String {
    if scope.is_empty() {
        reference.to_string()
    } else {
        format!("{}.{}", scope.join("."), reference)
    }
}

/// Walks the header scope tree, binding every identifier code that
/// matches one of `signals` to its dotted name.
fn bind_targets(
    items: &[ScopeItem],
    scope: &mut Vec<String>,
    signals: &[&str],
    targets: &mut HashMap<IdCode, String>,
    declared: &mut HashSet<IdCode>,
) {
    for item in items {
        match item {
            ScopeItem::Scope(child) => {
                scope.push(child.identifier.to_string());
                bind_targets(&child.children, scope, signals, targets, declared);
                scope.pop();
            }
            ScopeItem::Var(var) => {
                // `data[3:0]` written without a separating space
                let reference = var.reference.split('[').next().unwrap_or(&var.reference);
                let full_name = dotted(scope, reference);
                declared.insert(var.code);
                if signals.iter().any(|s| name_matches(&full_name, s)) {
                    targets.insert(var.code, full_name);
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

enum Step {
    Time(u64),
    Change(IdCode, Option<SignalValue>),
    End,
    Failed(io::Error),
}

/// Value changes of the requested signals, in file order.
pub struct SignalStream<R: Read = File> {
    flow: Option<FastFlow<R>>,
    /// Identifier code → declared hierarchical name, for the target signals.
    targets: HashMap<IdCode, String>,
    declared: HashSet<IdCode>,
    time: u64,
    diagnostics: VcdDiagnostics,
    missing: bool,
}

impl<R: Read> fmt::Debug for SignalStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalStream")
            .field("targets", &self.targets)
            .field("time", &self.time)
            .field("missing", &self.missing)
            .finish_non_exhaustive()
    }
}

impl SignalStream {
    /// Opens `path` and reads its header. A file that does not exist gives an
    /// empty stream flagged as missing.
    pub fn open(path: impl AsRef<Path>, signal: &str) -> Result<Self, ArtifactError> {
        Self::open_all(path, &[signal])
    }

    /// Like [`SignalStream::open`], interleaving several signals.
    pub fn open_all(path: impl AsRef<Path>, signals: &[&str]) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("waveform artifact {} not found", path.display());
                return Ok(Self::missing());
            }
            Err(source) => {
                return Err(ArtifactError::Open {
                    path: PathBuf::from(path),
                    source,
                });
            }
        };
        let stream = SignalStream::from_reader_all(file, signals).map_err(|source| {
            ArtifactError::Read {
                path: PathBuf::from(path),
                source,
            }
        })?;
        if !stream.is_declared() {
            debug!("signals {signals:?} not declared in {}", path.display());
        }
        Ok(stream)
    }

    fn missing() -> Self {
        Self {
            flow: None,
            targets: HashMap::new(),
            declared: HashSet::new(),
            time: 0,
            diagnostics: VcdDiagnostics::default(),
            missing: true,
        }
    }
}

impl<R: Read + Seek> SignalStream<R> {
    pub fn from_reader(reader: R, signal: &str) -> io::Result<Self> {
        Self::from_reader_all(reader, &[signal])
    }

    /// Parses the header, then rewinds `reader` so the flow reader sees
    /// the whole document.
    pub fn from_reader_all(mut reader: R, signals: &[&str]) -> io::Result<Self> {
        let start = reader.stream_position()?;
        let header = {
            let mut buffered = BufReader::with_capacity(READ_BUFFER, &mut reader);
            let mut parser = vcd_ng::Parser::new(&mut buffered);
            parser
                .parse_header()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        };
        reader.seek(SeekFrom::Start(start))?;

        let mut targets = HashMap::new();
        let mut declared = HashSet::new();
        bind_targets(&header.items, &mut Vec::new(), signals, &mut targets, &mut declared);

        Ok(Self {
            flow: Some(FastFlow::new(reader, READ_BUFFER)),
            targets,
            declared,
            time: 0,
            diagnostics: VcdDiagnostics::default(),
            missing: false,
        })
    }
}

impl<R: Read> SignalStream<R> {
    /// True when at least one target signal was found in the header.
    pub fn is_declared(&self) -> bool {
        !self.targets.is_empty()
    }

    /// True when `signal` resolved to a declaration.
    pub fn declares(&self, signal: &str) -> bool {
        self.targets.values().any(|name| name_matches(name, signal))
    }

    pub fn is_missing(&self) -> bool {
        self.missing
    }

    pub fn diagnostics(&self) -> VcdDiagnostics {
        self.diagnostics
    }

    fn change(&mut self, id: IdCode, value: Option<SignalValue>) -> Option<SignalEvent> {
        let Some(value) = value else {
            self.diagnostics.malformed_records += 1;
            return None;
        };
        match self.targets.get(&id) {
            Some(name) => Some(SignalEvent {
                timestamp: self.time,
                signal_name: name.clone(),
                value,
            }),
            None => {
                if !self.declared.contains(&id) {
                    self.diagnostics.unknown_ids += 1;
                }
                None
            }
        }
    }
}

impl<R: Read> Iterator for SignalStream<R> {
    type Item = SignalEvent;

    fn next(&mut self) -> Option<SignalEvent> {
        loop {
            let flow = self.flow.as_mut()?;
            let step = match flow.next_token() {
                Ok(Some(FastFlowToken::Timestamp(time))) => Step::Time(time),
                Ok(Some(FastFlowToken::Value(FFValueChange { id, bits, .. }))) => {
                    Step::Change(id, SignalValue::from_record(bits))
                }
                Ok(None) => Step::End,
                Err(e) => Step::Failed(e),
            };
            match step {
                Step::Time(time) => self.time = time,
                Step::Change(id, value) => {
                    if let Some(event) = self.change(id, value) {
                        return Some(event);
                    }
                }
                Step::End => {
                    self.flow = None;
                    return None;
                }
                Step::Failed(e) => {
                    // the flow reader cannot resynchronise after a bad record
                    if e.kind() == io::ErrorKind::InvalidData {
                        self.diagnostics.malformed_records += 1;
                    } else {
                        self.diagnostics.io_errors += 1;
                    }
                    debug!("waveform stream stopped at time {}: {e}", self.time);
                    self.flow = None;
                    return None;
                }
            }
        }
    }
}

/// Opens `path` and streams the value changes of `signal`.
pub fn stream_vcd_signals(path: impl AsRef<Path>, signal: &str) -> Result<SignalStream, ArtifactError> {
    SignalStream::open(path, signal)
}

/// Number of value changes that drive the signal to a non-zero value.
pub fn count_asserted(events: impl IntoIterator<Item = SignalEvent>) -> u64 {
    events.into_iter().filter(|e| e.value.is_asserted()).count() as u64
}
