use std::fmt;

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;

use crate::addr::LineSize;

pub const DEFAULT_CACHE_BYTES: usize = 1024 * 4;
pub const DEFAULT_LINE_BYTES: u32 = 1024;
pub const DEFAULT_LINES_PER_SET: usize = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("line size {line_bytes} is not a power of two")]
    LineSizeNotPowerOfTwo { line_bytes: u32 },
    #[error("cache size {cache_bytes} is not a multiple of line size {line_bytes}")]
    CacheSizeNotMultiple { cache_bytes: usize, line_bytes: u32 },
    #[error("cache holds no lines")]
    NoLines,
    #[error("lines per set must be positive")]
    NoLinesPerSet,
    #[error("{lines_per_set} lines per set do not evenly divide {total_lines} lines")]
    UnevenSets {
        total_lines: usize,
        lines_per_set: usize,
    },
}

/// Shape of the line array. Every line belongs to exactly one set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    total_lines: usize,
    lines_per_set: usize,
    number_of_sets: usize,
}

impl Geometry {
    pub fn new(total_lines: usize, lines_per_set: usize) -> Result<Self, ConfigError> {
        if total_lines == 0 {
            return Err(ConfigError::NoLines);
        }
        if lines_per_set == 0 {
            return Err(ConfigError::NoLinesPerSet);
        }
        if total_lines % lines_per_set != 0 {
            return Err(ConfigError::UnevenSets {
                total_lines,
                lines_per_set,
            });
        }
        Ok(Self {
            total_lines,
            lines_per_set,
            number_of_sets: total_lines / lines_per_set,
        })
    }
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }
    pub fn lines_per_set(&self) -> usize {
        self.lines_per_set
    }
    pub fn number_of_sets(&self) -> usize {
        self.number_of_sets
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines in {} sets of {}",
            self.total_lines, self.number_of_sets, self.lines_per_set
        )
    }
}

/// When the simulator prints the line table.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotMode {
    #[default]
    Never,
    /// after every access
    Every,
    /// after every miss, and after a hit that follows a miss
    OnChange,
}

impl fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotMode::Never => write!(f, "never"),
            SnapshotMode::Every => write!(f, "every"),
            SnapshotMode::OnChange => write!(f, "on-change"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    cache_bytes: usize,
    line_size: LineSize,
    geometry: Geometry,
    trace_len: Option<usize>,
    snapshot: SnapshotMode,
}

impl CacheConfig {
    pub fn new(
        cache_bytes: usize,
        line_bytes: u32,
        lines_per_set: usize,
    ) -> Result<Self, ConfigError> {
        let line_size = LineSize::new(line_bytes)?;
        if cache_bytes % line_bytes as usize != 0 {
            return Err(ConfigError::CacheSizeNotMultiple {
                cache_bytes,
                line_bytes,
            });
        }
        let geometry = Geometry::new(cache_bytes / line_bytes as usize, lines_per_set)?;
        Ok(Self {
            cache_bytes,
            line_size,
            geometry,
            trace_len: None,
            snapshot: SnapshotMode::Never,
        })
    }
    pub fn with_trace_len(self, trace_len: Option<usize>) -> Self {
        Self { trace_len, ..self }
    }
    pub fn with_snapshot(self, snapshot: SnapshotMode) -> Self {
        Self { snapshot, ..self }
    }
    pub fn cache_bytes(&self) -> usize {
        self.cache_bytes
    }
    pub fn line_size(&self) -> LineSize {
        self.line_size
    }
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
    pub fn trace_len(&self) -> Option<usize> {
        self.trace_len
    }
    pub fn snapshot(&self) -> SnapshotMode {
        self.snapshot
    }
}

impl fmt::Display for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cache size: {} bytes", self.cache_bytes)?;
        writeln!(f, " line size: {}", self.line_size)?;
        writeln!(f, "  geometry: {}", self.geometry)?;
        match self.trace_len {
            Some(n) => writeln!(f, "     trace: {n} addresses")?,
            None => writeln!(f, "     trace: until end of input")?,
        }
        write!(f, "  snapshot: {}", self.snapshot)
    }
}

/// Partially specified configuration, as read from a JSON file or flags.
#[derive(Default, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigRaw {
    pub cache_bytes: Option<usize>,
    pub line_bytes: Option<u32>,
    pub lines_per_set: Option<usize>,
    pub trace_len: Option<usize>,
    pub snapshot: Option<SnapshotMode>,
}

impl CacheConfigRaw {
    pub fn deser(file: impl std::io::Read) -> Result<CacheConfigRaw> {
        Ok(serde_json::from_reader(file)?)
    }
    /// fields set in `other` win.
    pub fn merge(self, other: CacheConfigRaw) -> Self {
        Self {
            cache_bytes: other.cache_bytes.or(self.cache_bytes),
            line_bytes: other.line_bytes.or(self.line_bytes),
            lines_per_set: other.lines_per_set.or(self.lines_per_set),
            trace_len: other.trace_len.or(self.trace_len),
            snapshot: other.snapshot.or(self.snapshot),
        }
    }
    pub fn resolve(self) -> Result<CacheConfig, ConfigError> {
        let config = CacheConfig::new(
            self.cache_bytes.unwrap_or(DEFAULT_CACHE_BYTES),
            self.line_bytes.unwrap_or(DEFAULT_LINE_BYTES),
            self.lines_per_set.unwrap_or(DEFAULT_LINES_PER_SET),
        )?;
        Ok(config
            .with_trace_len(self.trace_len)
            .with_snapshot(self.snapshot.unwrap_or_default()))
    }
}
