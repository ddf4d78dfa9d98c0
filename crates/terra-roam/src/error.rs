//! Error types for the bintree and the variance table file.

/// Errors raised by bintree mutation.
#[derive(Debug, thiserror::Error)]
pub enum BinTreeError {
    /// The node pool has no free slot for the requested split.
    #[error("triangle node pool exhausted ({capacity} nodes)")]
    PoolExhausted {
        /// Fixed capacity of the pool.
        capacity: usize,
    },
    /// Split/merge bookkeeping found neighbour links that disagree.
    #[error("bintree inconsistency: {0}")]
    Inconsistent(String),
}

/// Errors that can occur when loading or saving a variance table.
#[derive(Debug, thiserror::Error)]
pub enum VarianceError {
    /// Failed to read the table file from disk.
    #[error("failed to read variance table: {0}")]
    ReadError(#[source] std::io::Error),

    /// Failed to write the table file to disk.
    #[error("failed to write variance table: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is empty and has no level byte.
    #[error("variance table is empty")]
    Empty,

    /// The declared level is beyond what the static node packing supports.
    #[error("variance table level {0} exceeds the supported maximum")]
    LevelTooDeep(u8),

    /// The file length does not match the declared level.
    #[error("variance table has {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// Byte length implied by the level byte.
        expected: usize,
        /// Byte length actually present.
        actual: usize,
    },

    /// The file does not end with the `DE AD BE AD` trailer.
    #[error("variance table trailer is {0:02X?}, expected DE AD BE AD")]
    BadTrailer([u8; 4]),
}
