//! Precomputed per-node variance table and its binary file format.
//!
//! File layout: one byte `max_level`, then two bytes per statically addressed
//! node (`log2_variance`, `elevation_ratio`) for every node of levels
//! `0..=max_level`, then the trailer `DE AD BE AD`.

use std::path::Path;

use crate::error::VarianceError;

/// Deepest level the static node packing supports.
pub const MAX_TABLE_LEVEL: u8 = 20;

const TRAILER: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xAD];

/// Number of nodes in levels `0..=level` of the octahedral bintree.
pub fn total_nodes_for_level(level: u8) -> usize {
    8 * ((2usize << level) - 1)
}

/// Live node count of a tree holding every triangle of levels `0..=level`.
pub fn tris_for_level(level: u8) -> usize {
    total_nodes_for_level(level)
}

/// Static index of the first node at `level`.
pub fn level_offset(level: u8) -> usize {
    match level {
        0 => 0,
        l => total_nodes_for_level(l - 1),
    }
}

/// Quantised `(log2_variance, elevation_ratio)` pair for one node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VarianceEntry {
    pub log2_variance: u8,
    pub elevation_ratio: u8,
}

impl VarianceEntry {
    /// Quantise a squared midpoint displacement and split-apex elevation ratio.
    pub fn encode(displacement_sq: f64, min_radius: f64, ratio: f64) -> Self {
        let log2_variance = if displacement_sq > 0.0 {
            let q = (displacement_sq / (min_radius * min_radius)).log2().round() + 128.0;
            q.clamp(1.0, 255.0) as u8
        } else {
            0
        };
        Self {
            log2_variance,
            elevation_ratio: (ratio.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    /// Decoded squared displacement in planet units.
    pub fn displacement_sq(&self, min_radius: f64) -> f64 {
        if self.log2_variance == 0 {
            return 0.0;
        }
        min_radius * min_radius * 2f64.powi(self.log2_variance as i32 - 128)
    }

    pub fn ratio(&self) -> f64 {
        self.elevation_ratio as f64 / 255.0
    }
}

/// Read-only table of [`VarianceEntry`] indexed by static node index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarianceTable {
    max_level: u8,
    entries: Vec<VarianceEntry>,
}

impl VarianceTable {
    /// Build a table from entries for every node of levels `0..=max_level`.
    pub fn new(max_level: u8, entries: Vec<VarianceEntry>) -> Result<Self, VarianceError> {
        if max_level > MAX_TABLE_LEVEL {
            return Err(VarianceError::LevelTooDeep(max_level));
        }
        let expected = total_nodes_for_level(max_level);
        if entries.len() != expected {
            return Err(VarianceError::LengthMismatch {
                expected: Self::file_len(max_level),
                actual: 1 + entries.len() * 2 + TRAILER.len(),
            });
        }
        Ok(Self { max_level, entries })
    }

    fn file_len(max_level: u8) -> usize {
        1 + 2 * total_nodes_for_level(max_level) + TRAILER.len()
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<VarianceEntry> {
        self.entries.get(index as usize).copied()
    }

    pub fn entries(&self) -> &[VarianceEntry] {
        &self.entries
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VarianceError> {
        let &max_level = bytes.first().ok_or(VarianceError::Empty)?;
        if max_level > MAX_TABLE_LEVEL {
            return Err(VarianceError::LevelTooDeep(max_level));
        }
        let expected = Self::file_len(max_level);
        if bytes.len() != expected {
            return Err(VarianceError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let (body, trailer) = bytes[1..].split_at(expected - 1 - TRAILER.len());
        if trailer != TRAILER {
            let mut found = [0u8; 4];
            found.copy_from_slice(trailer);
            return Err(VarianceError::BadTrailer(found));
        }
        let entries = body
            .chunks_exact(2)
            .map(|pair| VarianceEntry {
                log2_variance: pair[0],
                elevation_ratio: pair[1],
            })
            .collect();
        Ok(Self { max_level, entries })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::file_len(self.max_level));
        bytes.push(self.max_level);
        for entry in &self.entries {
            bytes.push(entry.log2_variance);
            bytes.push(entry.elevation_ratio);
        }
        bytes.extend_from_slice(&TRAILER);
        bytes
    }

    pub fn load(path: &Path) -> Result<Self, VarianceError> {
        let bytes = std::fs::read(path).map_err(VarianceError::ReadError)?;
        let table = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            max_level = table.max_level,
            entries = table.len(),
            "Loaded variance table"
        );
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<(), VarianceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(VarianceError::WriteError)?;
        }
        std::fs::write(path, self.to_bytes()).map_err(VarianceError::WriteError)
    }
}
