use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{info, warn};

use crate::cache::SpectralCache;
use crate::graph::DirectedGraph;
use crate::pipeline::orchestrator::{ExecutionMode, OrchestratorStats, ParallelOrchestrator};
use crate::pipeline::resolvent::{ReducedMatrices, ReducedMatrixBuilder};
use crate::selection::SelectedNodes;
use crate::spectral::{PowerConfig, SpectralProjector, SpectralState};

#[derive(Debug, Clone)]
pub struct ReductionConfig {
    pub damping: f64,
    pub check_interval: usize,
    pub tolerance: f64,
    pub cap_offset: f64,
    pub noise_floor: f64,
    pub mode: ExecutionMode,
    pub threads: Option<usize>,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        let power = PowerConfig::default();
        Self {
            damping: power.damping,
            check_interval: power.check_interval,
            tolerance: power.tolerance,
            cap_offset: power.cap_offset,
            noise_floor: power.noise_floor,
            mode: ExecutionMode::Parallel,
            threads: None,
        }
    }
}

impl ReductionConfig {
    pub fn power_config(&self) -> PowerConfig {
        PowerConfig {
            damping: self.damping,
            check_interval: self.check_interval,
            tolerance: self.tolerance,
            cap_offset: self.cap_offset,
            noise_floor: self.noise_floor,
        }
    }

    pub fn orchestrator(&self) -> ParallelOrchestrator {
        ParallelOrchestrator::new(self.mode, self.threads)
    }
}

pub struct ReductionWorkflow {
    config: ReductionConfig,
    graph: Arc<DirectedGraph>,
    selection: Arc<SelectedNodes>,
    cache: Option<SpectralCache>,
}

impl ReductionWorkflow {
    pub fn new(
        config: ReductionConfig,
        graph: impl Into<Arc<DirectedGraph>>,
        selection: impl Into<Arc<SelectedNodes>>,
    ) -> Self {
        Self {
            config,
            graph: graph.into(),
            selection: selection.into(),
            cache: None,
        }
    }

    /// Reuses eigenvector pairs stored under `cache` and stores new ones.
    pub fn with_cache(mut self, cache: SpectralCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn execute(&self) -> Result<ReductionSummary> {
        let power = self.config.power_config();
        power.validate()?;

        let spectral_start = Instant::now();
        let (spectral, spectral_from_cache) = self.spectral_state(&power)?;
        let spectral_duration = spectral_start.elapsed();
        info!(
            "spectral projection ready in {:.3?} (cached: {})",
            spectral_duration, spectral_from_cache
        );

        let reduction_start = Instant::now();
        let nr = self.selection.len();
        let builder = ReducedMatrixBuilder::new(&self.graph, &spectral, &self.selection, power)?;
        let mut matrices = ReducedMatrices::zeros(nr);
        let stats = self.config.orchestrator().run(&builder, &mut matrices)?;
        let reduction_duration = reduction_start.elapsed();
        info!(
            "reduced {} columns ({} resolvent iterations) in {:.3?}",
            stats.columns(),
            stats.iterations(),
            reduction_duration
        );

        Ok(ReductionSummary {
            matrices,
            spectral,
            stats,
            spectral_duration,
            reduction_duration,
            spectral_from_cache,
        })
    }

    fn spectral_state(&self, power: &PowerConfig) -> Result<(Arc<SpectralState>, bool)> {
        if let Some(cache) = &self.cache {
            match cache.load(&self.graph, &self.selection, power) {
                Ok(Some(state)) => {
                    info!("loaded spectral state from cache {:?}", cache.root());
                    return Ok((Arc::new(state), true));
                }
                Ok(None) => {}
                Err(err) => warn!("ignoring unreadable spectral cache: {:#}", err),
            }
        }

        let state = SpectralProjector::new(&self.graph, *power).compute(&self.selection)?;
        if let Some(cache) = &self.cache {
            let dir = cache.store(&self.graph, &self.selection, power, &state)?;
            info!("stored spectral state in {:?}", dir);
        }
        Ok((Arc::new(state), false))
    }
}

pub struct ReductionSummary {
    pub matrices: ReducedMatrices,
    pub spectral: Arc<SpectralState>,
    pub stats: OrchestratorStats,
    pub spectral_duration: Duration,
    pub reduction_duration: Duration,
    pub spectral_from_cache: bool,
}
