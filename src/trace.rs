//! Text log artifacts.
//!
//! Simulator logs are only loosely structured, so addresses are pulled out by
//! several independent extractors whose matches are concatenated. The same
//! address found by two extractors counts twice.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::ArtifactError,
    geometry::{AccessEvent, CacheGeometry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extractor {
    /// `0x` followed by hex digits.
    HexPrefix,
    /// A keyword, one or more `:`/whitespace separators, then hex digits.
    Keyword(&'static str),
}

const EXTRACTORS: [Extractor; 3] = [
    Extractor::HexPrefix,
    Extractor::Keyword("addr"),
    Extractor::Keyword("address"),
];

impl Extractor {
    /// Finds the next token at or after `from`, returning its byte range.
    fn scan(self, text: &str, from: usize) -> Option<(usize, usize)> {
        let mut pos = from;
        loop {
            match self {
                Extractor::HexPrefix => {
                    let idx = pos + text.get(pos..)?.find("0x")?;
                    let start = idx + 2;
                    let end = hex_run_end(text, start);
                    if end > start {
                        return Some((start, end));
                    }
                    pos = start;
                }
                Extractor::Keyword(keyword) => {
                    let idx = pos + text.get(pos..)?.find(keyword)?;
                    let after = idx + keyword.len();
                    let start = separator_run_end(text, after);
                    if start > after {
                        let end = hex_run_end(text, start);
                        if end > start {
                            return Some((start, end));
                        }
                    }
                    pos = idx + 1;
                }
            }
        }
    }
}

fn hex_run_end(text: &str, start: usize) -> usize {
    start
        + text.as_bytes()[start..]
            .iter()
            .take_while(|b| b.is_ascii_hexdigit())
            .count()
}

fn separator_run_end(text: &str, start: usize) -> usize {
    text[start..]
        .char_indices()
        .find(|&(_, c)| c != ':' && !c.is_whitespace())
        .map(|(offset, _)| start + offset)
        .unwrap_or(text.len())
}

/// Lazily yields every hex address token of `text`, one extractor after the
/// other.
#[derive(Debug, Clone)]
pub struct AddressTokens<'a> {
    text: &'a str,
    stage: usize,
    pos: usize,
}

impl<'a> AddressTokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            stage: 0,
            pos: 0,
        }
    }
}

impl<'a> Iterator for AddressTokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            let extractor = EXTRACTORS.get(self.stage)?;
            match extractor.scan(self.text, self.pos) {
                Some((start, end)) => {
                    self.pos = end;
                    return Some(&self.text[start..end]);
                }
                None => {
                    self.stage += 1;
                    self.pos = 0;
                }
            }
        }
    }
}

/// Decodes address tokens into cache coordinates. Tokens that do not fit in
/// 64 bits are skipped and counted.
#[derive(Debug, Clone)]
pub struct AccessEvents<'a> {
    tokens: AddressTokens<'a>,
    geometry: CacheGeometry,
    skipped: usize,
}

impl AccessEvents<'_> {
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for AccessEvents<'_> {
    type Item = AccessEvent;

    fn next(&mut self) -> Option<AccessEvent> {
        for token in self.tokens.by_ref() {
            match u64::from_str_radix(token, 16) {
                Ok(address) => return Some(self.geometry.decode(address)),
                Err(_) => self.skipped += 1,
            }
        }
        None
    }
}

/// Summary counters printed by the simulator at the end of a run. A field is
/// `None` when its line is absent from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    pub cycles: Option<u64>,
    pub hits: Option<u64>,
    pub misses: Option<u64>,
    pub set_assoc_hits: Option<u64>,
    pub full_assoc_hits: Option<u64>,
    pub mode_switches: Option<u64>,
    pub set_assoc_time: Option<u64>,
    pub full_assoc_time: Option<u64>,
}

impl LogSummary {
    pub fn parse(text: &str) -> Self {
        Self {
            cycles: find_count(text, "Finished after ", Some(" cycles")),
            hits: find_count(text, "Cache hits: ", None),
            misses: find_count(text, "Cache misses: ", None),
            set_assoc_hits: find_count(text, "Set associative hits: ", None),
            full_assoc_hits: find_count(text, "Fully associative hits: ", None),
            mode_switches: find_count(text, "Mode switches: ", None),
            set_assoc_time: find_count(text, "Time in set associative mode: ", Some(" cycles")),
            full_assoc_time: find_count(
                text,
                "Time in fully associative mode: ",
                Some(" cycles"),
            ),
        }
    }
}

/// First decimal count following `prefix` (and followed by `suffix`, if
/// given).
fn find_count(text: &str, prefix: &str, suffix: Option<&str>) -> Option<u64> {
    text.match_indices(prefix).find_map(|(idx, _)| {
        let start = idx + prefix.len();
        let len = text.as_bytes()[start..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if len == 0 {
            return None;
        }
        let end = start + len;
        if suffix.is_some_and(|s| !text[end..].starts_with(s)) {
            return None;
        }
        text[start..end].parse().ok()
    })
}

/// A simulator log, read in full. A log that does not exist loads as an
/// empty, missing artifact.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub name: String,
    pub path: PathBuf,
    text: String,
    missing: bool,
}

impl LogFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let (text, missing) = match fs::read(path) {
            Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("log artifact {} not found", path.display());
                (String::new(), true)
            }
            Err(source) => {
                return Err(ArtifactError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        debug!("loaded {} ({} bytes)", path.display(), text.len());
        Ok(Self {
            name,
            path: path.to_path_buf(),
            text,
            missing,
        })
    }

    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            text: text.into(),
            missing: false,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.missing
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn access_events(&self, geometry: CacheGeometry) -> AccessEvents<'_> {
        AccessEvents {
            tokens: AddressTokens::new(&self.text),
            geometry,
            skipped: 0,
        }
    }

    pub fn summary(&self) -> LogSummary {
        LogSummary::parse(&self.text)
    }
}
