use serde::Deserialize;

use crate::error::AnalysisError;

/// Shape of the simulated data cache. Only `num_sets` and `line_size` take
/// part in address decoding; the other two fields are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheGeometry {
    pub total_size: usize, // in Bytes
    pub num_sets: usize,
    pub ways: usize,
    pub line_size: usize, // in Bytes
}

impl Default for CacheGeometry {
    fn default() -> Self {
        // CV32A60X write-through data cache
        Self {
            total_size: 2048,
            num_sets: 16,
            ways: 8,
            line_size: 16,
        }
    }
}

/// Coordinates of one address inside the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEvent {
    pub raw_address: u64,
    pub set_index: usize,
    pub tag: u64,
    pub offset: u64,
}

impl CacheGeometry {
    pub fn new(total_size: usize, num_sets: usize, ways: usize, line_size: usize) -> Self {
        Self {
            total_size,
            num_sets,
            ways,
            line_size,
        }
    }

    /// Checks the decoder preconditions: both `num_sets` and `line_size`
    /// must be non-zero powers of two.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.num_sets.is_power_of_two() {
            return Err(AnalysisError::InvalidGeometry(format!(
                "num_sets must be a power of two, got {}",
                self.num_sets
            )));
        }
        if !self.line_size.is_power_of_two() {
            return Err(AnalysisError::InvalidGeometry(format!(
                "line_size must be a power of two, got {}",
                self.line_size
            )));
        }
        Ok(())
    }

    pub fn offset_bits(&self) -> u32 {
        self.line_size.trailing_zeros()
    }

    pub fn index_bits(&self) -> u32 {
        self.num_sets.trailing_zeros()
    }

    pub fn decode(&self, address: u64) -> AccessEvent {
        let cache_line = address >> self.offset_bits();
        let set_index = (cache_line & (self.num_sets as u64 - 1)) as usize;
        let tag = cache_line >> self.index_bits();
        AccessEvent {
            raw_address: address,
            set_index,
            tag,
            offset: address & (self.line_size as u64 - 1),
        }
    }
}
