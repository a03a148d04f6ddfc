use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::error::ReductionError;
use crate::graph::model::DirectedGraph;

/// Upper bound on the edge buffer reserved from the header alone.
const EDGE_RESERVE_LIMIT: usize = 1 << 20;

impl DirectedGraph {
    /// Builds the CSR layout from 0-indexed `(source, target)` pairs that are
    /// already grouped by ascending source.
    pub fn from_sorted_edges(
        size: usize,
        edges: &[(usize, usize)],
    ) -> Result<Self, ReductionError> {
        let mut first_pos = Vec::with_capacity(size + 1);
        let mut targets = Vec::with_capacity(edges.len());
        first_pos.push(0);

        let mut row = 0usize;
        for (index, &(from, to)) in edges.iter().enumerate() {
            if from >= size || to >= size {
                return Err(ReductionError::EdgeOutOfRange {
                    index,
                    from,
                    to,
                    size,
                });
            }
            if from < row {
                return Err(ReductionError::UnsortedEdges {
                    index,
                    from,
                    previous: row,
                });
            }
            while row < from {
                row += 1;
                first_pos.push(index);
            }
            targets.push(to);
        }
        while first_pos.len() < size + 1 {
            first_pos.push(edges.len());
        }

        let out_degree: Vec<usize> = first_pos.windows(2).map(|w| w[1] - w[0]).collect();
        let dangling = out_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| node)
            .collect();

        Ok(Self {
            size,
            first_pos,
            targets,
            out_degree,
            dangling,
        })
    }

    /// Builds the graph from 0-indexed edges in any order. Edges are sorted
    /// by source (stable, so targets keep their relative order).
    pub fn from_edges(
        size: usize,
        mut edges: Vec<(usize, usize)>,
    ) -> Result<Self, ReductionError> {
        edges.sort_by_key(|&(from, _)| from);
        Self::from_sorted_edges(size, &edges)
    }
}

/// Reads the plain-text edge-list format: node count, edge count, then one
/// 1-indexed `source target` pair per line.
#[derive(Debug, Default)]
pub struct GraphLoader;

impl GraphLoader {
    pub fn from_path(path: &Path) -> Result<DirectedGraph> {
        let file = File::open(path).with_context(|| format!("open network file {:?}", path))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("parse network file {:?}", path))
    }

    pub fn from_edge_list_str(text: &str) -> Result<DirectedGraph> {
        Self::from_reader(text.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<DirectedGraph> {
        let mut lines = BufReader::new(reader)
            .lines()
            .enumerate()
            .map(|(idx, line)| line.map(|l| (idx + 1, l)));

        let size = next_header(&mut lines, "node count")?;
        let expected_links = next_header(&mut lines, "edge count")?;

        let mut edges = Vec::with_capacity(expected_links.min(EDGE_RESERVE_LIMIT));
        for entry in lines {
            let (line_no, line) = entry?;
            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };
            let second = fields
                .next()
                .ok_or_else(|| anyhow!("line {line_no}: expected two node ids"))?;
            let from = parse_node_id(first, size, line_no)?;
            let to = parse_node_id(second, size, line_no)?;
            edges.push((from, to));
        }

        if edges.len() != expected_links {
            return Err(anyhow!(
                "header declares {} edges but {} were read",
                expected_links,
                edges.len()
            ));
        }

        Ok(DirectedGraph::from_edges(size, edges)?)
    }
}

fn next_header<I>(lines: &mut I, what: &str) -> Result<usize>
where
    I: Iterator<Item = std::io::Result<(usize, String)>>,
{
    for entry in lines.by_ref() {
        let (line_no, line) = entry?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let token = trimmed.split_whitespace().next().unwrap_or(trimmed);
        return token
            .parse::<usize>()
            .with_context(|| format!("line {line_no}: invalid {what} {:?}", token));
    }
    Err(anyhow!("missing {what} header"))
}

fn parse_node_id(token: &str, size: usize, line_no: usize) -> Result<usize> {
    let id = token
        .parse::<usize>()
        .with_context(|| format!("line {line_no}: invalid node id {:?}", token))?;
    if id == 0 || id > size {
        return Err(anyhow!(
            "line {line_no}: node id {id} outside 1..={size}"
        ));
    }
    Ok(id - 1)
}
