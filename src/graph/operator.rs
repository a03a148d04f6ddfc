//! Damped random-walk operator `G = (1-δ)·(S + dangling/N) + δ·E/N` and its
//! adjoint, where `S` spreads each node's mass evenly over its successors
//! and δ is the teleport probability (`1 - alpha`).

use crate::error::Result;
use crate::graph::model::DirectedGraph;
use crate::numeric::DenseVector;
use crate::numeric::vector::check_len;

impl DirectedGraph {
    /// `output = G · input`.
    ///
    /// Mass sitting on dangling nodes is spread uniformly over all nodes.
    /// With `normalized` the teleport term assumes `Σ input == 1`; otherwise
    /// the actual sum is used. `damping == 0` skips the teleport blend.
    pub fn multiply(
        &self,
        damping: f64,
        output: &mut DenseVector,
        input: &DenseVector,
        normalized: bool,
    ) -> Result<()> {
        check_len(self.size, input.dim())?;
        check_len(self.size, output.dim())?;
        if self.size == 0 {
            return Ok(());
        }

        let n = self.size as f64;
        let inp = input.as_slice();
        let dangling_share = self.dangling.iter().map(|&node| inp[node]).sum::<f64>() / n;

        let out = output.as_mut_slice();
        out.fill(dangling_share);
        for node in 0..self.size {
            let degree = self.out_degree[node];
            if degree == 0 {
                continue;
            }
            let share = inp[node] / degree as f64;
            for &target in self.successors(node) {
                out[target] += share;
            }
        }

        if damping == 0.0 {
            return Ok(());
        }
        let total = if normalized { 1.0 } else { input.sum() };
        blend(out, damping, total / n);
        Ok(())
    }

    /// `output = Gᵀ · input`, the exact adjoint of [`DirectedGraph::multiply`].
    pub fn multiply_transpose(
        &self,
        damping: f64,
        output: &mut DenseVector,
        input: &DenseVector,
        normalized: bool,
    ) -> Result<()> {
        check_len(self.size, input.dim())?;
        check_len(self.size, output.dim())?;
        if self.size == 0 {
            return Ok(());
        }

        let n = self.size as f64;
        let inp = input.as_slice();
        let input_sum = input.sum();
        let dangling_share = input_sum / n;

        let out = output.as_mut_slice();
        for (node, slot) in out.iter_mut().enumerate() {
            let degree = self.out_degree[node];
            *slot = if degree == 0 {
                dangling_share
            } else {
                self.successors(node).iter().map(|&t| inp[t]).sum::<f64>() / degree as f64
            };
        }

        if damping == 0.0 {
            return Ok(());
        }
        let total = if normalized { 1.0 } else { input_sum };
        blend(out, damping, total / n);
        Ok(())
    }
}

fn blend(out: &mut [f64], damping: f64, uniform: f64) {
    let keep = 1.0 - damping;
    let teleport = damping * uniform;
    out.iter_mut().for_each(|v| *v = keep * *v + teleport);
}
