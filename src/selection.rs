use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexSet;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ReductionError;

/// Ordered set of distinct 0-indexed node ids. The position of a node in
/// the set is its row/column index in every reduced matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedNodes {
    nodes: Vec<usize>,
    names: Option<Vec<String>>,
}

impl SelectedNodes {
    /// Validates that every id is below `graph_size` and appears once.
    pub fn new(nodes: Vec<usize>, graph_size: usize) -> Result<Self, ReductionError> {
        let mut seen = IndexSet::with_capacity(nodes.len());
        for &node in &nodes {
            if node >= graph_size {
                return Err(ReductionError::SelectionOutOfRange {
                    node,
                    size: graph_size,
                });
            }
            if !seen.insert(node) {
                return Err(ReductionError::DuplicateSelection { node });
            }
        }
        Ok(Self { nodes, names: None })
    }

    /// Attaches display names, one per selected node.
    pub fn with_names(mut self, names: Vec<String>) -> Result<Self, ReductionError> {
        if names.len() != self.nodes.len() {
            return Err(ReductionError::DimensionMismatch {
                expected: self.nodes.len(),
                got: names.len(),
            });
        }
        self.names = Some(names);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in matrix order.
    pub fn as_slice(&self) -> &[usize] {
        &self.nodes
    }

    /// Display name of the node at `position`, if names were attached.
    pub fn name(&self, position: usize) -> Option<&str> {
        self.names
            .as_ref()
            .and_then(|names| names.get(position))
            .map(String::as_str)
    }

    pub fn has_names(&self) -> bool {
        self.names.is_some()
    }
}

/// Reads the selected-node file (`nr [limit]` header, then `nr` 1-indexed
/// ids) and the optional aligned name file.
#[derive(Debug, Default)]
pub struct SelectionLoader {
    limit: Option<usize>,
}

impl SelectionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops ids above `limit` (1-indexed). Overrides a header limit.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn load(
        &self,
        node_path: &Path,
        name_path: Option<&Path>,
        graph_size: usize,
    ) -> Result<SelectedNodes> {
        let text = fs::read_to_string(node_path)
            .with_context(|| format!("read node file {:?}", node_path))?;
        let names = name_path
            .map(|path| {
                fs::read_to_string(path).with_context(|| format!("read name file {:?}", path))
            })
            .transpose()?;
        self.parse(&text, names.as_deref(), graph_size)
            .with_context(|| format!("parse node file {:?}", node_path))
    }

    pub fn parse(
        &self,
        node_text: &str,
        name_text: Option<&str>,
        graph_size: usize,
    ) -> Result<SelectedNodes> {
        let mut lines = node_text
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (_, header) = lines.next().ok_or_else(|| anyhow!("missing node count header"))?;
        let mut header_fields = header.split_whitespace();
        let declared: usize = header_fields
            .next()
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("invalid node count header {:?}", header))?;
        let header_limit = header_fields
            .next()
            .map(|token| {
                token
                    .parse::<usize>()
                    .with_context(|| format!("invalid limit in header {:?}", header))
            })
            .transpose()?;
        let limit = self.limit.or(header_limit);

        // every id needs its own line, so the text length bounds the count
        let mut ids = Vec::with_capacity(declared.min(node_text.len()));
        for (line_no, line) in lines.by_ref().take(declared) {
            let token = line.split_whitespace().next().unwrap_or(line);
            let id: usize = token
                .parse()
                .with_context(|| format!("line {line_no}: invalid node id {:?}", token))?;
            if id == 0 {
                return Err(anyhow!("line {line_no}: node ids are 1-indexed"));
            }
            ids.push(id);
        }
        if ids.len() < declared {
            return Err(anyhow!(
                "header declares {} nodes but only {} were read",
                declared,
                ids.len()
            ));
        }
        let extra = lines.count();
        if extra > 0 {
            warn!("ignoring {} node lines beyond the declared {}", extra, declared);
        }

        let names = match name_text {
            Some(text) => {
                let names: Vec<String> = text
                    .lines()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
                    .take(declared)
                    .collect();
                if names.len() < declared {
                    return Err(anyhow!(
                        "name file has {} entries, expected {}",
                        names.len(),
                        declared
                    ));
                }
                Some(names)
            }
            None => None,
        };

        let keep = |id: &usize| limit.map_or(true, |limit| *id <= limit);
        let nodes: Vec<usize> = ids.iter().filter(|id| keep(*id)).map(|id| id - 1).collect();
        let selection = SelectedNodes::new(nodes, graph_size)?;

        match names {
            Some(names) => {
                let kept = ids
                    .iter()
                    .zip(names)
                    .filter(|(id, _)| keep(*id))
                    .map(|(_, name)| name)
                    .collect();
                Ok(selection.with_names(kept)?)
            }
            None => Ok(selection),
        }
    }
}
