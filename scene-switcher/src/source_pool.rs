use crate::detection::DetectorAdapter;
use crate::types::{
    Result, SourceFailure, SourceReading, SwitcherConfig, SwitcherError, TeardownReport,
};
use futures::future::join_all;
use interfaces::defs::{FrameSource, Observation, SourceError, SourceOpener, SourceSpec};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type PollReply = std::result::Result<Vec<Observation>, SourceError>;

enum WorkerCommand {
    Poll {
        cycle: u64,
        reply: oneshot::Sender<PollReply>,
    },
    Release {
        reply: oneshot::Sender<std::result::Result<(), SourceError>>,
    },
}

/// Handle to the task that exclusively owns one open source.
struct SourceWorker {
    label: String,
    order: usize,
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

impl SourceWorker {
    fn spawn(
        order: usize,
        label: String,
        source: Box<dyn FrameSource>,
        detector: DetectorAdapter,
        frames_per_cycle: u32,
    ) -> Self {
        // Capacity 1: at most one poll can wait behind the one in progress
        let (commands, receiver) = mpsc::channel(1);
        let task = tokio::spawn(run_worker(
            label.clone(),
            source,
            detector,
            frames_per_cycle,
            receiver,
        ));

        Self {
            label,
            order,
            commands,
            task,
        }
    }

    async fn poll(&self, cycle: u64, deadline: Duration) -> SourceReading {
        let outcome = self.request_poll(cycle, deadline).await;
        SourceReading {
            label: self.label.clone(),
            order: self.order,
            outcome,
        }
    }

    async fn request_poll(
        &self,
        cycle: u64,
        deadline: Duration,
    ) -> std::result::Result<Vec<Observation>, SourceFailure> {
        let (reply, response) = oneshot::channel();
        match self.commands.try_send(WorkerCommand::Poll { cycle, reply }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => return Err(SourceFailure::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(SourceFailure::WorkerGone),
        }

        match tokio::time::timeout(deadline, response).await {
            Ok(Ok(Ok(observations))) => Ok(observations),
            Ok(Ok(Err(e))) => Err(SourceFailure::Read(e)),
            Ok(Err(_)) => Err(SourceFailure::WorkerGone),
            Err(_) => Err(SourceFailure::TimedOut(deadline)),
        }
    }

    async fn release(self, deadline: Duration) -> std::result::Result<(), String> {
        let (reply, response) = oneshot::channel();
        let request = async {
            self.commands
                .send(WorkerCommand::Release { reply })
                .await
                .map_err(|_| "worker already stopped".to_string())?;
            match response.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("worker stopped before confirming release".to_string()),
            }
        };

        match tokio::time::timeout(deadline, request).await {
            Ok(result) => result,
            Err(_) => {
                // The source is dropped with the task
                self.task.abort();
                Err(format!("release did not finish within {:?}", deadline))
            }
        }
    }
}

async fn run_worker(
    label: String,
    mut source: Box<dyn FrameSource>,
    detector: DetectorAdapter,
    frames_per_cycle: u32,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Poll { cycle, reply } => {
                if reply.is_closed() {
                    debug!("Dropping stale poll for cycle {} on {}", cycle, label);
                    continue;
                }
                let outcome =
                    poll_once(source.as_mut(), &label, &detector, frames_per_cycle).await;
                if reply.send(outcome).is_err() {
                    debug!("Result for cycle {} on {} arrived after the deadline", cycle, label);
                }
            }
            WorkerCommand::Release { reply } => {
                let result = source.release().await;
                let _ = reply.send(result);
                return;
            }
        }
    }

    // Pool dropped without an explicit release
    if let Err(e) = source.release().await {
        warn!("Failed to release {} on drop: {}", label, e);
    }
}

async fn poll_once(
    source: &mut dyn FrameSource,
    label: &str,
    detector: &DetectorAdapter,
    frames_per_cycle: u32,
) -> PollReply {
    let frame = source.read().await?;
    let observations = detector.detect(label, &frame).await;

    if frames_per_cycle > 0 {
        if let Err(e) = source.skip(frames_per_cycle).await {
            warn!("Failed to skip {} frames on {}: {}", frames_per_cycle, label, e);
        }
    }

    Ok(observations)
}

/// The open sources, each polled by its own worker task.
///
/// A failure on one source never blocks or fails the others. Dropping the
/// pool closes every worker channel, which releases the remaining sources.
pub struct SourcePool {
    workers: Vec<SourceWorker>,
    unavailable: Vec<(String, SourceError)>,
    read_timeout: Duration,
}

impl SourcePool {
    /// Opens every configured source concurrently.
    ///
    /// Sources that fail to open are logged and excluded for the rest of the
    /// run. Fails with [`SwitcherError::NoUsableSources`] if none open.
    pub async fn open(
        specs: &[SourceSpec],
        opener: &dyn SourceOpener,
        detector: DetectorAdapter,
        config: &SwitcherConfig,
    ) -> Result<Self> {
        let open_timeout = config.open_timeout();
        let attempts = join_all(specs.iter().map(|spec| async move {
            match tokio::time::timeout(open_timeout, opener.open(spec)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Open {
                    address: spec.address.to_string(),
                    reason: format!("no response within {:?}", open_timeout),
                }),
            }
        }))
        .await;

        let mut workers = Vec::new();
        let mut unavailable = Vec::new();
        for ((order, spec), attempt) in specs.iter().enumerate().zip(attempts) {
            match attempt {
                Ok(source) => {
                    info!("Opened source {} ({})", spec.label, spec.address);
                    workers.push(SourceWorker::spawn(
                        order,
                        spec.label.clone(),
                        source,
                        detector.clone(),
                        config.frames_per_cycle,
                    ));
                }
                Err(e) => {
                    error!("Failed to open source {} ({}): {}", spec.label, spec.address, e);
                    unavailable.push((spec.label.clone(), e));
                }
            }
        }

        if workers.is_empty() {
            return Err(SwitcherError::NoUsableSources {
                attempted: specs.len(),
            });
        }

        info!("Source pool ready: {} of {} sources open", workers.len(), specs.len());

        Ok(Self {
            workers,
            unavailable,
            read_timeout: config.read_timeout(),
        })
    }

    /// Labels of the usable sources, in configured order.
    pub fn labels(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.label.clone()).collect()
    }

    /// Sources that failed to open, with the reason.
    pub fn unavailable(&self) -> &[(String, SourceError)] {
        &self.unavailable
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Polls every usable source once, concurrently, each bounded by the read
    /// timeout. Readings come back in configured order.
    pub async fn poll_all(&self, cycle: u64) -> Vec<SourceReading> {
        join_all(
            self.workers
                .iter()
                .map(|worker| worker.poll(cycle, self.read_timeout)),
        )
        .await
    }

    /// Releases every source. Failures are collected, never raised.
    pub async fn release_all(&mut self) -> TeardownReport {
        let workers = std::mem::take(&mut self.workers);
        let deadline = self.read_timeout;

        let results = join_all(workers.into_iter().map(|worker| async move {
            let label = worker.label.clone();
            (label, worker.release(deadline).await)
        }))
        .await;

        let mut report = TeardownReport::default();
        for (label, result) in results {
            match result {
                Ok(()) => {
                    debug!("Released source {}", label);
                    report.released += 1;
                }
                Err(reason) => {
                    warn!("Failed to release source {}: {}", label, reason);
                    report.failures.push((label, reason));
                }
            }
        }
        report
    }
}
