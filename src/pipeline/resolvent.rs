use std::fmt;
use std::str::FromStr;

use log::{debug, trace};
use nalgebra::DMatrix;

use crate::error::{ReductionError, Result};
use crate::graph::DirectedGraph;
use crate::numeric::vector::check_len;
use crate::numeric::DenseVector;
use crate::selection::SelectedNodes;
use crate::spectral::{PowerConfig, SpectralState};

/// The five reduced matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// Full reduced Google matrix `G_rr + G_pr + G_qr`.
    R,
    /// Direct one-step links between selected nodes.
    Rr,
    /// Leading-eigenvector (projector `P`) contribution.
    Pr,
    /// Background-mediated (projector `Q`) contribution.
    Qr,
    /// Indirect part `G_pr + G_qr`.
    I,
}

impl MatrixKind {
    pub const ALL: [MatrixKind; 5] = [
        MatrixKind::R,
        MatrixKind::Rr,
        MatrixKind::Pr,
        MatrixKind::Qr,
        MatrixKind::I,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatrixKind::R => "G_R",
            MatrixKind::Rr => "G_rr",
            MatrixKind::Pr => "G_pr",
            MatrixKind::Qr => "G_qr",
            MatrixKind::I => "G_I",
        }
    }

    /// Suffix used in report file names (`G<suffix>_...`).
    pub fn file_tag(self) -> &'static str {
        match self {
            MatrixKind::R => "R",
            MatrixKind::Rr => "rr",
            MatrixKind::Pr => "pr",
            MatrixKind::Qr => "qr",
            MatrixKind::I => "I",
        }
    }
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatrixKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().trim_start_matches("g_") {
            "r" | "gr" => Ok(MatrixKind::R),
            "rr" | "grr" => Ok(MatrixKind::Rr),
            "pr" | "gpr" => Ok(MatrixKind::Pr),
            "qr" | "gqr" => Ok(MatrixKind::Qr),
            "i" | "gi" => Ok(MatrixKind::I),
            other => Err(format!("unknown reduced matrix {other:?}")),
        }
    }
}

/// `G_R`, `G_rr`, `G_pr`, `G_qr` and `G_I`, each `nr × nr`. Column `i`
/// describes the flow out of selected node `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedMatrices {
    pub g_r: DMatrix<f64>,
    pub g_rr: DMatrix<f64>,
    pub g_pr: DMatrix<f64>,
    pub g_qr: DMatrix<f64>,
    pub g_i: DMatrix<f64>,
}

impl ReducedMatrices {
    pub fn zeros(nr: usize) -> Self {
        Self {
            g_r: DMatrix::zeros(nr, nr),
            g_rr: DMatrix::zeros(nr, nr),
            g_pr: DMatrix::zeros(nr, nr),
            g_qr: DMatrix::zeros(nr, nr),
            g_i: DMatrix::zeros(nr, nr),
        }
    }

    pub fn get(&self, kind: MatrixKind) -> &DMatrix<f64> {
        match kind {
            MatrixKind::R => &self.g_r,
            MatrixKind::Rr => &self.g_rr,
            MatrixKind::Pr => &self.g_pr,
            MatrixKind::Qr => &self.g_qr,
            MatrixKind::I => &self.g_i,
        }
    }

    /// Every matrix must be `nr × nr`.
    pub fn validate(&self, nr: usize) -> Result<()> {
        for kind in MatrixKind::ALL {
            let matrix = self.get(kind);
            if matrix.nrows() != nr || matrix.ncols() != nr {
                return Err(ReductionError::MatrixShape {
                    name: kind.name(),
                    rows: matrix.nrows(),
                    cols: matrix.ncols(),
                    expected: nr,
                });
            }
        }
        Ok(())
    }

    pub fn write_column(&mut self, column: &ReducedColumn) {
        let i = column.index;
        self.g_r.column_mut(i).copy_from_slice(&column.g_r);
        self.g_rr.column_mut(i).copy_from_slice(&column.g_rr);
        self.g_pr.column_mut(i).copy_from_slice(&column.g_pr);
        self.g_qr.column_mut(i).copy_from_slice(&column.g_qr);
        self.g_i.column_mut(i).copy_from_slice(&column.g_i);
    }
}

/// One column of every reduced matrix, produced for a single selected node.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedColumn {
    pub index: usize,
    pub g_r: Vec<f64>,
    pub g_rr: Vec<f64>,
    pub g_pr: Vec<f64>,
    pub g_qr: Vec<f64>,
    pub g_i: Vec<f64>,
    /// Resolvent iterations performed.
    pub iterations: usize,
    /// Last L1 change of the resolvent sum.
    pub quality: f64,
}

/// Work buffers for one column computation, reused across columns by the
/// worker that owns them.
#[derive(Debug, Clone)]
pub struct ColumnScratch {
    impulse: DenseVector,
    output: DenseVector,
    sum: DenseVector,
    previous: DenseVector,
    term: DenseVector,
    spare: DenseVector,
}

impl ColumnScratch {
    pub fn new(dim: usize) -> Self {
        Self {
            impulse: DenseVector::zeros(dim),
            output: DenseVector::zeros(dim),
            sum: DenseVector::zeros(dim),
            previous: DenseVector::zeros(dim),
            term: DenseVector::zeros(dim),
            spare: DenseVector::zeros(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.impulse.dim()
    }
}

/// Expands the resolvent of the background block for each selected node.
pub struct ReducedMatrixBuilder<'a> {
    graph: &'a DirectedGraph,
    spectral: &'a SpectralState,
    selection: &'a SelectedNodes,
    damping: f64,
    max_iter: usize,
}

impl<'a> ReducedMatrixBuilder<'a> {
    pub fn new(
        graph: &'a DirectedGraph,
        spectral: &'a SpectralState,
        selection: &'a SelectedNodes,
        config: PowerConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_len(graph.node_count(), spectral.psi_left.dim())?;
        check_len(graph.node_count(), spectral.psi_right.dim())?;
        Ok(Self {
            graph,
            spectral,
            selection,
            damping: config.damping,
            max_iter: config.max_iterations(),
        })
    }

    /// Number of selected nodes, one column each.
    pub fn column_count(&self) -> usize {
        self.selection.len()
    }

    /// Fresh work buffers sized for this graph. Each worker owns one.
    pub fn scratch(&self) -> ColumnScratch {
        ColumnScratch::new(self.graph.node_count())
    }

    /// Computes column `column` of all five matrices.
    pub fn compute_column(
        &self,
        column: usize,
        scratch: &mut ColumnScratch,
    ) -> Result<ReducedColumn> {
        check_len(self.graph.node_count(), scratch.dim())?;
        if column >= self.selection.len() {
            return Err(ReductionError::DimensionMismatch {
                expected: self.selection.len(),
                got: column + 1,
            });
        }
        let graph = self.graph;
        let spectral = self.spectral;
        let damping = self.damping;
        let selected = self.selection.as_slice();
        let ColumnScratch {
            impulse,
            output,
            sum,
            previous,
            term,
            spare,
        } = scratch;

        impulse.fill(0.0);
        impulse[selected[column]] = 1.0;
        graph.multiply(damping, output, impulse, true)?;

        let g_rr = gather(output, selected);
        let mut g_r = g_rr.clone();
        zero_rows(output, selected);

        sum.copy_from(output)?;
        spectral.project_p(output, spectral.dlambda)?;
        spectral.project_q(sum)?;

        term.copy_from(sum)?;
        let mut iterations = 0;
        let mut quality = 0.0;
        for step in 0..self.max_iter {
            iterations = step + 1;
            previous.copy_from(sum)?;
            graph.multiply(damping, spare, term, false)?;
            term.swap(spare);
            zero_rows(term, selected);
            spectral.project_q(term)?;
            sum.add_assign(term)?;
            quality = previous.diff_norm1(sum)?;
            if step % 10 == 0 {
                trace!(
                    "column {:5} step {:5}: quality {:.10e} |f| {:.10e}",
                    column,
                    step,
                    quality,
                    term.norm1()
                );
            }
            if quality <= 0.0 {
                break;
            }
        }
        debug!(
            "column {:5} converged after {} steps: quality {:.10e} |f| {:.10e}",
            column,
            iterations,
            quality,
            term.norm1()
        );

        graph.multiply(damping, term, output, false)?;
        let g_pr = gather(term, selected);
        graph.multiply(damping, term, sum, false)?;
        let g_qr = gather(term, selected);
        output.add_assign(sum)?;
        graph.multiply(damping, term, output, false)?;
        let g_i = gather(term, selected);
        g_r.iter_mut().zip(&g_i).for_each(|(r, i)| *r += i);

        Ok(ReducedColumn {
            index: column,
            g_r,
            g_rr,
            g_pr,
            g_qr,
            g_i,
            iterations,
            quality,
        })
    }
}

fn gather(vector: &DenseVector, selected: &[usize]) -> Vec<f64> {
    selected.iter().map(|&node| vector[node]).collect()
}

fn zero_rows(vector: &mut DenseVector, selected: &[usize]) {
    for &node in selected {
        vector[node] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralProjector;

    fn cycle_setup() -> (DirectedGraph, SelectedNodes, SpectralState) {
        let graph =
            DirectedGraph::from_sorted_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).expect("cycle");
        let selection = SelectedNodes::new(vec![0, 2], 4).expect("selection");
        let spectral = SpectralProjector::new(&graph, PowerConfig::with_damping(0.15))
            .compute(&selection)
            .expect("projection");
        (graph, selection, spectral)
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn cycle_column_matches_hand_computation() {
        let (graph, selection, spectral) = cycle_setup();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let mut scratch = builder.scratch();
        let column = builder.compute_column(0, &mut scratch).expect("column");

        assert_close(&column.g_rr, &[0.0375, 0.0375]);
        assert_close(&column.g_pr, &[0.4625, 0.4625]);
        assert_close(&column.g_qr, &[-0.36125, 0.36125]);
        assert_close(&column.g_i, &[0.10125, 0.82375]);
        assert_close(&column.g_r, &[0.13875, 0.86125]);
        assert!((column.g_r.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn indirect_part_is_sum_of_projected_parts() {
        let (graph, selection, spectral) = cycle_setup();
        let builder =
            ReducedMatrixBuilder::new(&graph, &spectral, &selection, PowerConfig::default())
                .expect("builder");
        let mut scratch = builder.scratch();
        for index in 0..builder.column_count() {
            let column = builder.compute_column(index, &mut scratch).expect("column");
            for row in 0..column.g_i.len() {
                let combined = column.g_pr[row] + column.g_qr[row];
                assert!((column.g_i[row] - combined).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn wrong_matrix_shape_is_a_configuration_error() {
        let mut matrices = ReducedMatrices::zeros(2);
        matrices.g_qr = DMatrix::zeros(2, 3);
        assert_eq!(
            matrices.validate(2),
            Err(ReductionError::MatrixShape {
                name: "G_qr",
                rows: 2,
                cols: 3,
                expected: 2
            })
        );
        assert!(ReducedMatrices::zeros(2).validate(2).is_ok());
    }

    #[test]
    fn write_column_fills_only_its_slot() {
        let mut matrices = ReducedMatrices::zeros(2);
        let column = ReducedColumn {
            index: 1,
            g_r: vec![1.0, 2.0],
            g_rr: vec![3.0, 4.0],
            g_pr: vec![5.0, 6.0],
            g_qr: vec![7.0, 8.0],
            g_i: vec![9.0, 10.0],
            iterations: 1,
            quality: 0.0,
        };
        matrices.write_column(&column);
        assert_eq!(matrices.g_qr[(0, 1)], 7.0);
        assert_eq!(matrices.g_qr[(1, 1)], 8.0);
        assert_eq!(matrices.g_qr[(0, 0)], 0.0);
        assert_eq!(matrices.g_r[(1, 0)], 0.0);
    }

    #[test]
    fn matrix_kind_parses_cli_names() {
        assert_eq!("gqr".parse::<MatrixKind>(), Ok(MatrixKind::Qr));
        assert_eq!("G_R".parse::<MatrixKind>(), Ok(MatrixKind::R));
        assert_eq!("i".parse::<MatrixKind>(), Ok(MatrixKind::I));
        assert!("gx".parse::<MatrixKind>().is_err());
    }
}
