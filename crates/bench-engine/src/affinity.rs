use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::dispatcher::{DispatchError, WorkerMessage};
use crate::job::{BoxJob, RETRY_BACKOFF};

/// A dispatcher variant that pins every job sharing a key to the same
/// worker.
///
/// Workers here do not advertise on a readiness pool; each consumes its
/// own inbox, so all executions for one key are serialized and totally
/// ordered on the worker the key was first assigned to. Assignment is lazy
/// round-robin on first observation and immutable for the dispatcher's
/// lifetime. Retries re-enter the owning worker's inbox, preserving
/// affinity across attempts.
pub struct KeyedDispatcher {
    inboxes: Vec<mpsc::Sender<WorkerMessage>>,
    assignments: Mutex<Assignments>,
    tasks: JoinSet<()>,
}

#[derive(Default)]
struct Assignments {
    by_key: HashMap<String, usize>,
    next: usize,
}

impl KeyedDispatcher {
    /// Start `workers` keyed workers (at least one).
    pub fn start(name: &str, workers: usize) -> Self {
        let workers = workers.max(1);
        let mut tasks = JoinSet::new();
        let mut inboxes = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let (inbox_tx, inbox_rx) = mpsc::channel::<WorkerMessage>(1);
            inboxes.push(inbox_tx.clone());
            tasks.spawn(run_keyed_worker(worker_id, inbox_tx, inbox_rx));
        }

        debug!(name, workers, "keyed dispatcher started");
        Self {
            inboxes,
            assignments: Mutex::new(Assignments::default()),
            tasks,
        }
    }

    /// Route `job` to the worker owning `key`, assigning one round-robin on
    /// first sight. Blocks while that worker's inbox is occupied, which is
    /// what serializes a key's executions.
    pub async fn dispatch_to_key(&self, job: BoxJob, key: &str) -> Result<(), DispatchError> {
        let worker_id = self.assign(key);
        self.inboxes[worker_id]
            .send(WorkerMessage::Job(job))
            .await
            .map_err(|_| DispatchError)
    }

    /// The worker `key` is (or becomes) pinned to.
    pub fn worker_for_key(&self, key: &str) -> usize {
        self.assign(key)
    }

    fn assign(&self, key: &str) -> usize {
        let mut assignments = self.assignments.lock().expect("assignment map poisoned");
        match assignments.by_key.get(key) {
            Some(&worker_id) => worker_id,
            None => {
                let worker_id = assignments.next % self.inboxes.len();
                assignments.next += 1;
                assignments.by_key.insert(key.to_string(), worker_id);
                worker_id
            }
        }
    }

    /// Stop all workers and wait for them to exit. Same contract as
    /// [`Dispatcher::stop`](crate::Dispatcher::stop): drain first.
    pub async fn stop(mut self) {
        for inbox in &self.inboxes {
            let _ = inbox.send(WorkerMessage::Stop).await;
        }
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn run_keyed_worker(
    worker_id: usize,
    inbox_tx: mpsc::Sender<WorkerMessage>,
    mut inbox_rx: mpsc::Receiver<WorkerMessage>,
) {
    loop {
        match inbox_rx.recv().await {
            Some(WorkerMessage::Job(mut job)) => {
                if let Err(err) = job.execute(worker_id).await {
                    if job.should_retry(&err) {
                        // Back onto this worker's own inbox: the retry must
                        // not migrate to another worker.
                        let requeue = inbox_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(RETRY_BACKOFF).await;
                            let _ = requeue.send(WorkerMessage::Job(job)).await;
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
