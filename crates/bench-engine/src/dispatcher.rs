use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::debug;

use crate::job::{BoxJob, RETRY_BACKOFF};

/// Queueing into a dispatcher whose workers have already been stopped.
#[derive(Debug, thiserror::Error)]
#[error("dispatcher is stopped")]
pub struct DispatchError;

pub(crate) enum WorkerMessage {
    Job(BoxJob),
    Stop,
}

/// Routes queued jobs to a fixed set of workers, readiest first.
///
/// The dispatcher never picks a worker: each worker advertises itself by
/// placing a sender to its single-slot inbox on a pool channel of capacity
/// `W`, and every admitted job is handed to a short-lived forwarder task
/// that pairs it with the next advertised inbox. Multiple admitted jobs can
/// therefore wait on pool readiness concurrently without head-of-line
/// blocking, while at most `W` executions ever run in parallel.
pub struct Dispatcher {
    intake_tx: mpsc::Sender<BoxJob>,
    inboxes: Vec<mpsc::Sender<WorkerMessage>>,
    quit_tx: oneshot::Sender<()>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    /// Start `workers` workers (at least one) and the dispatch loop.
    pub fn start(name: &str, workers: usize) -> Self {
        let workers = workers.max(1);
        let (intake_tx, intake_rx) = mpsc::channel::<BoxJob>(1);
        let (pool_tx, pool_rx) = async_channel::bounded::<mpsc::Sender<WorkerMessage>>(workers);
        let (quit_tx, quit_rx) = oneshot::channel();

        let mut tasks = JoinSet::new();
        let mut inboxes = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let (inbox_tx, inbox_rx) = mpsc::channel::<WorkerMessage>(1);
            inboxes.push(inbox_tx.clone());
            tasks.spawn(run_worker(
                worker_id,
                pool_tx.clone(),
                inbox_tx,
                inbox_rx,
                intake_tx.clone(),
            ));
        }
        tasks.spawn(dispatch_loop(intake_rx, pool_rx, quit_rx));

        debug!(name, workers, "dispatcher started");
        Self {
            intake_tx,
            inboxes,
            quit_tx,
            tasks,
        }
    }

    /// Admit a job. Blocks until the dispatch loop accepts it; acceptance
    /// does not mean a worker is ready.
    pub async fn queue(&self, job: BoxJob) -> Result<(), DispatchError> {
        self.intake_tx.send(job).await.map_err(|_| DispatchError)
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// Must not be called while producers (including pending retries) may
    /// still queue jobs; drain the in-flight counter first.
    pub async fn stop(mut self) {
        let _ = self.quit_tx.send(());
        for inbox in &self.inboxes {
            let _ = inbox.send(WorkerMessage::Stop).await;
        }
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn dispatch_loop(
    mut intake: mpsc::Receiver<BoxJob>,
    pool: async_channel::Receiver<mpsc::Sender<WorkerMessage>>,
    mut quit: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            job = intake.recv() => {
                let Some(job) = job else { break };
                let pool = pool.clone();
                tokio::spawn(async move {
                    if let Ok(inbox) = pool.recv().await {
                        let _ = inbox.send(WorkerMessage::Job(job)).await;
                    }
                });
            }
            _ = &mut quit => break,
        }
    }
}

async fn run_worker(
    worker_id: usize,
    pool: async_channel::Sender<mpsc::Sender<WorkerMessage>>,
    inbox_tx: mpsc::Sender<WorkerMessage>,
    mut inbox_rx: mpsc::Receiver<WorkerMessage>,
    requeue: mpsc::Sender<BoxJob>,
) {
    loop {
        // Advertise readiness. The pool holds one slot per worker, so this
        // returns immediately unless the dispatch loop is gone.
        if pool.send(inbox_tx.clone()).await.is_err() {
            return;
        }

        match inbox_rx.recv().await {
            Some(WorkerMessage::Job(mut job)) => {
                if let Err(err) = job.execute(worker_id).await {
                    if job.should_retry(&err) {
                        // Re-queue in the background after the backoff so
                        // this worker returns to the pool immediately.
                        let requeue = requeue.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(RETRY_BACKOFF).await;
                            let _ = requeue.send(job).await;
                        });
                    } else {
                        job.fail(err);
                    }
                }
            }
            Some(WorkerMessage::Stop) | None => return,
        }
    }
}
