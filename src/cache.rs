use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::graph::DirectedGraph;
use crate::selection::SelectedNodes;
use crate::spectral::{PowerConfig, SpectralState};

const SPECTRAL_SUBDIR: &str = "spectral";
const METADATA_FILE: &str = "meta.json";
const STATE_FILE: &str = "state.json";
const CACHE_VERSION: u32 = 1;

/// On-disk store of eigenvector pairs, keyed by graph, selection and
/// iteration parameters.
#[derive(Debug, Clone)]
pub struct SpectralCache {
    root: PathBuf,
}

impl SpectralCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the cached state for these inputs, or `None` on a miss or a
    /// version mismatch.
    pub fn load(
        &self,
        graph: &DirectedGraph,
        selection: &SelectedNodes,
        config: &PowerConfig,
    ) -> Result<Option<SpectralState>> {
        let dir = self.entry_dir(graph, selection, config);
        let Some(meta) = read_entry::<CachedMeta>(&dir, METADATA_FILE)? else {
            return Ok(None);
        };
        if meta.version != CACHE_VERSION
            || meta.node_count != graph.node_count()
            || meta.selected != selection.len()
        {
            return Ok(None);
        }

        let state = read_entry::<SpectralState>(&dir, STATE_FILE)?;
        Ok(state.filter(|state| state.dim() == graph.node_count()))
    }

    /// Writes `state` under its key and returns the entry directory.
    pub fn store(
        &self,
        graph: &DirectedGraph,
        selection: &SelectedNodes,
        config: &PowerConfig,
        state: &SpectralState,
    ) -> Result<PathBuf> {
        let dir = self.entry_dir(graph, selection, config);
        fs::create_dir_all(&dir).with_context(|| format!("create cache directory {:?}", dir))?;

        let meta = CachedMeta {
            version: CACHE_VERSION,
            node_count: graph.node_count(),
            selected: selection.len(),
            config: *config,
        };
        // metadata goes last: an entry without it is treated as a miss
        write_entry(&dir, STATE_FILE, state)?;
        write_entry(&dir, METADATA_FILE, &meta)?;
        Ok(dir)
    }

    fn entry_dir(
        &self,
        graph: &DirectedGraph,
        selection: &SelectedNodes,
        config: &PowerConfig,
    ) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(graph.node_count() as u64).to_le_bytes());
        for &value in graph.first_positions().iter().chain(graph.targets()) {
            hasher.update(&(value as u64).to_le_bytes());
        }
        hasher.update(&(selection.len() as u64).to_le_bytes());
        for &node in selection.as_slice() {
            hasher.update(&(node as u64).to_le_bytes());
        }
        hasher.update(&config.damping.to_le_bytes());
        hasher.update(&(config.check_interval as u64).to_le_bytes());
        hasher.update(&config.tolerance.to_le_bytes());
        hasher.update(&config.cap_offset.to_le_bytes());
        hasher.update(&config.noise_floor.to_le_bytes());
        let dirname = hasher.finalize().to_hex().to_string();
        self.root.join(SPECTRAL_SUBDIR).join(dirname)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedMeta {
    version: u32,
    node_count: usize,
    selected: usize,
    config: PowerConfig,
}

/// Decodes `file` of a cache entry. A missing file is a cache miss.
fn read_entry<T>(dir: &Path, file: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let path = dir.join(file);
    let handle = match File::open(&path) {
        Ok(handle) => handle,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("open spectral cache entry {:?}", path));
        }
    };
    serde_json::from_reader(BufReader::new(handle))
        .map(Some)
        .with_context(|| format!("decode spectral cache entry {:?}", path))
}

/// Encodes `value` next to its final name, then renames it into place so a
/// reader never sees a half-written file.
fn write_entry<T>(dir: &Path, file: &str, value: &T) -> Result<()>
where
    T: Serialize,
{
    let path = dir.join(file);
    let staging = dir.join(format!("{file}.partial"));
    let handle = File::create(&staging)
        .with_context(|| format!("create spectral cache entry {:?}", staging))?;
    let mut writer = BufWriter::new(handle);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("encode spectral cache entry {:?}", staging))?;
    writer
        .flush()
        .with_context(|| format!("flush spectral cache entry {:?}", staging))?;
    fs::rename(&staging, &path)
        .with_context(|| format!("publish spectral cache entry {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralProjector;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "rgmatrix-cache-{label}-{}-{nanos}",
            std::process::id()
        ))
    }

    #[test]
    fn stored_state_is_returned_for_same_inputs_only() {
        let root = temp_root("roundtrip");
        let cache = SpectralCache::new(&root);
        let graph =
            DirectedGraph::from_sorted_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).expect("cycle");
        let selection = SelectedNodes::new(vec![0, 2], 4).expect("selection");
        let config = PowerConfig::default();
        let state = SpectralProjector::new(&graph, config)
            .compute(&selection)
            .expect("projection");

        assert!(cache
            .load(&graph, &selection, &config)
            .expect("load")
            .is_none());
        cache
            .store(&graph, &selection, &config, &state)
            .expect("store");
        let cached = cache
            .load(&graph, &selection, &config)
            .expect("load")
            .expect("hit");
        assert!(cached.psi_left.diff_norm1(&state.psi_left).expect("dim") < 1e-15);
        assert!(cached.psi_right.diff_norm1(&state.psi_right).expect("dim") < 1e-15);
        assert!((cached.dlambda - state.dlambda).abs() < 1e-15);

        let other = PowerConfig::with_damping(0.2);
        assert!(cache
            .load(&graph, &selection, &other)
            .expect("load")
            .is_none());
        let moved = SelectedNodes::new(vec![1, 3], 4).expect("selection");
        assert!(cache.load(&graph, &moved, &config).expect("load").is_none());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn entry_without_metadata_is_a_miss() {
        let root = temp_root("partial");
        let cache = SpectralCache::new(&root);
        let graph =
            DirectedGraph::from_sorted_edges(3, &[(0, 1), (1, 2), (2, 0)]).expect("cycle");
        let selection = SelectedNodes::new(vec![1], 3).expect("selection");
        let config = PowerConfig::default();
        let state = SpectralProjector::new(&graph, config)
            .compute(&selection)
            .expect("projection");

        let dir = cache
            .store(&graph, &selection, &config, &state)
            .expect("store");
        assert!(dir.join(STATE_FILE).exists());
        assert!(!dir.join(format!("{STATE_FILE}.partial")).exists());
        fs::remove_file(dir.join(METADATA_FILE)).expect("drop metadata");
        assert!(cache
            .load(&graph, &selection, &config)
            .expect("load")
            .is_none());

        fs::write(dir.join(METADATA_FILE), "{ not json").expect("corrupt metadata");
        let err = cache.load(&graph, &selection, &config).unwrap_err();
        assert!(format!("{err:#}").contains("decode spectral cache entry"));

        fs::remove_dir_all(&root).ok();
    }
}
