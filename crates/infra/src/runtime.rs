//! Process-level composition: one config builds every component, wires the
//! dispatch table, and owns the background workers' lifecycle.
//!
//! The queue is constructed once here and injected into everything that
//! enqueues or consumes, so there is no process-global broker state.

use std::sync::Arc;

use restock_queue::{
    InMemoryJobStore, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobStore, JobStoreError,
};

use crate::admin::RegionAdmin;
use crate::config::PipelineConfig;
use crate::fanout::FanoutBuilder;
use crate::handlers::{register_all, HandlerContext};
use crate::ingest::StockChangeDetector;
use crate::lifecycle::LifecycleController;
use crate::mailer::Mailer;
use crate::stores::{InMemoryRegionStore, InMemorySubscriberStore, RegionStore, SubscriberStore};
use crate::sweeper::{ExpirySweeper, SweeperHandle};

/// Fully wired pipeline, workers not yet running.
///
/// `config.retention` bounds the job store built here and
/// `config.sweep_interval` paces the sweeper started by [`start`];
/// construct through this type rather than assembling components by hand
/// so the tunables actually take effect.
///
/// [`start`]: PipelineRuntime::start
pub struct PipelineRuntime {
    pub regions: Arc<dyn RegionStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub queue: Arc<dyn JobStore>,
    pub detector: StockChangeDetector,
    pub fanout: FanoutBuilder,
    pub lifecycle: LifecycleController,
    pub admin: RegionAdmin,
    executor: JobExecutor<Arc<dyn JobStore>>,
    config: PipelineConfig,
}

impl PipelineRuntime {
    pub fn new(config: PipelineConfig, mailer: Arc<dyn Mailer>) -> Self {
        let regions: Arc<dyn RegionStore> = InMemoryRegionStore::arc();
        let subscribers: Arc<dyn SubscriberStore> = InMemorySubscriberStore::arc();
        let queue: Arc<dyn JobStore> =
            Arc::new(InMemoryJobStore::with_retention(config.retention));

        let mut executor = JobExecutor::new(queue.clone());
        register_all(
            &mut executor,
            &HandlerContext {
                regions: regions.clone(),
                subscribers: subscribers.clone(),
                queue: queue.clone(),
                mailer,
                retry_policy: config.retry_policy.clone(),
            },
        );

        Self {
            detector: StockChangeDetector::new(regions.clone()),
            fanout: FanoutBuilder::new(
                regions.clone(),
                queue.clone(),
                config.retry_policy.clone(),
            ),
            lifecycle: LifecycleController::new(
                subscribers.clone(),
                regions.clone(),
                queue.clone(),
                config.clone(),
            ),
            admin: RegionAdmin::new(regions.clone(), queue.clone(), config.retry_policy.clone()),
            regions,
            subscribers,
            queue,
            executor,
            config,
        }
    }

    /// Claim and run every ready job on the calling thread. Test/ops
    /// utility; deployments use [`PipelineRuntime::start`].
    pub fn drain_ready(&self) -> Result<usize, JobStoreError> {
        self.executor.drain_ready()
    }

    /// Start the worker and the expiry sweeper. The returned pipeline keeps
    /// serving synchronous calls; background processing stops when its
    /// handles are shut down.
    pub fn start(self) -> RunningPipeline {
        let sweeper = ExpirySweeper::new(
            self.subscribers.clone(),
            self.config.sweep_interval,
            self.config.resubscribe_cooldown,
        )
        .spawn();
        let worker = self.executor.spawn(JobExecutorConfig::default());

        RunningPipeline {
            regions: self.regions,
            subscribers: self.subscribers,
            queue: self.queue,
            detector: self.detector,
            fanout: self.fanout,
            lifecycle: self.lifecycle,
            admin: self.admin,
            worker,
            sweeper,
        }
    }
}

/// A pipeline with its background workers running.
pub struct RunningPipeline {
    pub regions: Arc<dyn RegionStore>,
    pub subscribers: Arc<dyn SubscriberStore>,
    pub queue: Arc<dyn JobStore>,
    pub detector: StockChangeDetector,
    pub fanout: FanoutBuilder,
    pub lifecycle: LifecycleController,
    pub admin: RegionAdmin,
    worker: JobExecutorHandle,
    sweeper: SweeperHandle,
}

impl RunningPipeline {
    /// Stop the worker and sweeper, waiting for in-flight work to finish.
    pub fn shutdown(self) {
        self.worker.shutdown();
        self.sweeper.shutdown();
    }
}
