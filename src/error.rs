//! Error types for the reduced Google matrix core.

use thiserror::Error;

/// Result alias used by the numerical core.
pub type Result<T> = std::result::Result<T, ReductionError>;

/// Failures raised by vector arithmetic, graph construction and the
/// reduction itself. I/O and parsing failures are reported through
/// `anyhow` by the loaders, with the offending file attached.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReductionError {
    /// Two operands (or an operand and a graph) disagree on length.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// An output matrix does not match the selected node count.
    #[error("wrong matrix size of {name}: {rows}x{cols}, expected {expected}x{expected}")]
    MatrixShape {
        name: &'static str,
        rows: usize,
        cols: usize,
        expected: usize,
    },

    /// An edge endpoint lies outside `0..size`.
    #[error("edge {index} ({from} -> {to}) references a node outside 0..{size}")]
    EdgeOutOfRange {
        index: usize,
        from: usize,
        to: usize,
        size: usize,
    },

    /// Edges handed to the CSR builder are not grouped by ascending source.
    #[error("edges are not sorted by source: edge {index} has source {from} after source {previous}")]
    UnsortedEdges {
        index: usize,
        from: usize,
        previous: usize,
    },

    #[error("selected node {node} is outside the graph of {size} nodes")]
    SelectionOutOfRange { node: usize, size: usize },

    #[error("selected node {node} appears more than once")]
    DuplicateSelection { node: usize },

    /// The selection covers the whole graph, leaving no background subspace.
    #[error("selection of {selected} nodes leaves no background nodes")]
    EmptyBackground { selected: usize },

    #[error("damping factor {0} outside [0, 1]")]
    InvalidDamping(f64),

    /// Every entry of an iterate was removed by the leak set.
    #[error("probability mass vanished after {iteration} power iterations")]
    VanishingMass { iteration: usize },

    /// Left and right eigenvectors are orthogonal and cannot be normalised.
    #[error("left and right eigenvectors are orthogonal (overlap {overlap})")]
    DegenerateProjection { overlap: f64 },

    /// A column slot was written twice.
    #[error("column {0} written more than once")]
    ColumnRewritten(usize),
}
