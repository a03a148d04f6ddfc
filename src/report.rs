use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::DMatrix;

use crate::error::ReductionError;
use crate::pipeline::MatrixKind;
use crate::selection::SelectedNodes;

/// Writes a reduced matrix as `i j value[ name_i name_j]` lines, one block
/// per row separated by a blank line.
pub struct ReportWriter<'a> {
    selection: &'a SelectedNodes,
}

impl<'a> ReportWriter<'a> {
    pub fn new(selection: &'a SelectedNodes) -> Self {
        Self { selection }
    }

    pub fn write<W: Write>(&self, kind: MatrixKind, matrix: &DMatrix<f64>, mut out: W) -> Result<()> {
        let nr = self.selection.len();
        if matrix.nrows() != nr || matrix.ncols() != nr {
            return Err(ReductionError::MatrixShape {
                name: kind.name(),
                rows: matrix.nrows(),
                cols: matrix.ncols(),
                expected: nr,
            }
            .into());
        }
        for i in 0..nr {
            for j in 0..nr {
                write!(out, "{} {} {:.16e}", i, j, matrix[(i, j)])?;
                if let (Some(left), Some(right)) = (self.selection.name(i), self.selection.name(j)) {
                    write!(out, " {} {}", left, right)?;
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_to_path(&self, kind: MatrixKind, matrix: &DMatrix<f64>, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("create report file {:?}", path))?;
        self.write(kind, matrix, BufWriter::new(file))
            .with_context(|| format!("write {} to {:?}", kind, path))
    }
}

/// `G<kind>_<network base>_<node base>_<nr>.dat`
pub fn default_file_name(
    kind: MatrixKind,
    network_path: &Path,
    node_path: &Path,
    nr: usize,
) -> String {
    let network = network_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let network_base = network.split('.').next().unwrap_or_default();
    let nodes = node_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let node_base = nodes.strip_suffix(".nodes").unwrap_or(&nodes);
    format!("G{}_{}_{}_{}.dat", kind.file_tag(), network_base, node_base, nr)
}
