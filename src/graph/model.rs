use serde::{Deserialize, Serialize};

/// Directed graph in compressed-row form.
///
/// The successors of node `i` are `targets[first_pos[i]..first_pos[i + 1]]`
/// and `out_degree[i]` equals the length of that range. Nodes without
/// successors are listed, in ascending order, in `dangling`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectedGraph {
    pub(crate) size: usize,
    pub(crate) first_pos: Vec<usize>,
    pub(crate) targets: Vec<usize>,
    pub(crate) out_degree: Vec<usize>,
    pub(crate) dangling: Vec<usize>,
}

impl DirectedGraph {
    /// Number of nodes `N`. Node ids run over `0..N`.
    pub fn node_count(&self) -> usize {
        self.size
    }

    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    /// Targets of the out-links of `node`, in input order.
    ///
    /// Panics if `node >= node_count()`.
    pub fn successors(&self, node: usize) -> &[usize] {
        &self.targets[self.first_pos[node]..self.first_pos[node + 1]]
    }

    /// Panics if `node >= node_count()`.
    pub fn out_degree(&self, node: usize) -> usize {
        self.out_degree[node]
    }

    /// Nodes without out-links, ascending.
    pub fn dangling(&self) -> &[usize] {
        &self.dangling
    }

    /// Row offsets into [`targets`](Self::targets), `N + 1` entries.
    pub fn first_positions(&self) -> &[usize] {
        &self.first_pos
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }
}
