use crate::aggregator::OccupancyScorer;
use crate::arbitration::{ArbitrationOutcome, ArbitrationScheduler};
use crate::controller::SwitchControllerAdapter;
use crate::detection::DetectorAdapter;
use crate::source_pool::SourcePool;
use crate::types::{CycleReport, Result, SwitcherConfig, TeardownReport};
use chrono::Utc;
use interfaces::defs::{Detector, SceneController, SourceOpener, SourceSpec};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Runtime context for one switching session: the open sources, the
/// scorer, the arbitration state and the scene controller.
pub struct SceneSwitcher {
    pool: SourcePool,
    scorer: OccupancyScorer,
    scheduler: ArbitrationScheduler,
    controller: SwitchControllerAdapter,
    cycle_interval: Duration,
    cycle: u64,
}

impl SceneSwitcher {
    pub fn new(
        pool: SourcePool,
        controller: SwitchControllerAdapter,
        config: &SwitcherConfig,
    ) -> Self {
        Self {
            pool,
            scorer: OccupancyScorer::from_config(config),
            scheduler: ArbitrationScheduler::new(config.cadence),
            controller,
            cycle_interval: config.cycle_interval(),
            cycle: 0,
        }
    }

    /// Opens the sources and assembles a switcher around an already
    /// connected controller. The controller is disconnected if no source
    /// can be opened.
    pub async fn start(
        sources: &[SourceSpec],
        opener: &dyn SourceOpener,
        detector: Arc<dyn Detector>,
        controller: Box<dyn SceneController>,
        config: &SwitcherConfig,
    ) -> Result<Self> {
        let mut controller = SwitchControllerAdapter::new(controller, config.cooldown());
        let detector = DetectorAdapter::new(detector);
        info!("Using detector {}", detector.detector_name());

        let pool = match SourcePool::open(sources, opener, detector, config).await {
            Ok(pool) => pool,
            Err(e) => {
                if let Err(disconnect_error) = controller.disconnect().await {
                    warn!("Failed to disconnect scene controller: {}", disconnect_error);
                }
                return Err(e);
            }
        };

        Ok(Self::new(pool, controller, config))
    }

    pub fn pool(&self) -> &SourcePool {
        &self.pool
    }

    pub fn scheduler(&self) -> &ArbitrationScheduler {
        &self.scheduler
    }

    pub fn controller(&self) -> &SwitchControllerAdapter {
        &self.controller
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycle
    }

    /// Polls every source, scores the cycle and, on decision points,
    /// arbitrates the active scene.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let started_at = Utc::now();

        // Step 1: poll all sources concurrently
        let readings = self.pool.poll_all(self.cycle).await;

        // Step 2: fold into per-source occupancy
        let (scores, failures) = self.scorer.aggregate(&readings);
        for (label, failure) in &failures {
            warn!("Cycle {}: no result from {}: {}", self.cycle, label, failure);
        }
        debug!(
            "Cycle {}: {:?}",
            self.cycle,
            scores
                .entries()
                .iter()
                .map(|e| (e.label.as_str(), e.count))
                .collect::<Vec<_>>()
        );

        // Step 3: arbitrate when the cadence says so
        let arbitration = self.scheduler.on_cycle(&scores, &mut self.controller).await;
        if let Some(ArbitrationOutcome::Unchanged { scene }) = &arbitration {
            debug!("Cycle {}: keeping {}", self.cycle, scene);
        }

        CycleReport {
            cycle: self.cycle,
            started_at,
            scores,
            failures,
            arbitration,
        }
    }

    /// Runs cycles until `shutdown` resolves, then tears everything down.
    pub async fn run<F>(mut self, shutdown: F) -> TeardownReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Switching between {} sources every {} cycles",
            self.pool.len(),
            self.scheduler.cadence() + 1
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _report = self.run_cycle() => {}
            }

            if !self.cycle_interval.is_zero() {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(self.cycle_interval) => {}
                }
            }
        }

        info!("Stop requested after {} cycles", self.cycle);
        self.shutdown().await
    }

    /// Releases every source and disconnects the controller. Each step runs
    /// even when an earlier one fails.
    pub async fn shutdown(mut self) -> TeardownReport {
        let mut report = self.pool.release_all().await;

        match self.controller.disconnect().await {
            Ok(()) => debug!("Scene controller disconnected"),
            Err(e) => {
                error!("Failed to disconnect scene controller: {}", e);
                report
                    .failures
                    .push(("scene controller".to_string(), e.to_string()));
            }
        }

        if report.is_clean() {
            info!("Released {} sources", report.released);
        } else {
            warn!(
                "Released {} sources with {} teardown failures",
                report.released,
                report.failures.len()
            );
        }
        report
    }
}
