//! Background work queue: exactly one job runs at a time, in submission
//! order. Jobs deliver results through whatever channel they capture;
//! stale-revision results are discarded by the receiver, not the queue.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WorkQueue {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // One at a time: wait for the blocking job to finish before
                // pulling the next.
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    tracing::error!(error = %e, "work queue job panicked");
                }
            }
        });
        Self { tx }
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn jobs_run_in_submission_order() {
        let queue = WorkQueue::spawn();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..4usize {
            let tx = tx.clone();
            let counter = counter.clone();
            queue.submit(move || {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send((i, seen));
            });
        }

        for expected in 0..4usize {
            let (i, seen) = rx.recv().await.expect("job result");
            assert_eq!(i, expected);
            assert_eq!(seen, expected);
        }
    }
}
