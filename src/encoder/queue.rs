use crate::error::EncodeError;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Box<dyn FnOnce(bool) -> JobFuture + Send>;

/// Single-consumer FIFO queue serializing every encoder invocation.
///
/// Jobs run one at a time in enqueue order. Each job runs on its own task so a panic
/// fails that job with `TaskPanicked` and the worker moves on.
pub struct EncodeQueue {
    sender: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    processing: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl EncodeQueue {
    /// Create the queue and spawn its worker. Jobs still queued when `shutdown`
    /// fires resolve to `Cancelled`.
    pub fn new(shutdown: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let processing = Arc::new(AtomicBool::new(false));

        tokio::spawn(queue_worker(
            receiver,
            Arc::clone(&pending),
            Arc::clone(&processing),
            shutdown.clone(),
        ));

        Self {
            sender,
            pending,
            processing,
            shutdown,
        }
    }

    /// Queue `task`. The job is placed in the queue immediately, before the
    /// returned future is first polled.
    pub fn enqueue<F, Fut, T>(
        &self,
        task: F,
    ) -> impl Future<Output = Result<T, EncodeError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, EncodeError>> + Send + 'static,
        T: Send + 'static,
    {
        let receiver = self.submit(task);
        async move {
            receiver?
                .await
                .map_err(|_| EncodeError::QueueClosed)?
        }
    }

    fn submit<F, Fut, T>(
        &self,
        task: F,
    ) -> Result<oneshot::Receiver<Result<T, EncodeError>>, EncodeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, EncodeError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move |cancelled| {
            Box::pin(async move {
                let result = if cancelled {
                    Err(EncodeError::Cancelled)
                } else {
                    match tokio::spawn(async move { task().await }).await {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => Err(EncodeError::TaskPanicked),
                        Err(_) => Err(EncodeError::Cancelled),
                    }
                };
                // The caller may have stopped waiting
                let _ = result_tx.send(result);
            })
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(EncodeError::QueueClosed);
        }
        Ok(result_rx)
    }

    /// Jobs waiting behind the one currently running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }
}

async fn queue_worker(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    pending: Arc<AtomicUsize>,
    processing: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    info!("Encode queue worker started");

    while let Some(job) = receiver.recv().await {
        pending.fetch_sub(1, Ordering::SeqCst);
        let cancelled = shutdown.is_cancelled();
        if cancelled {
            warn!("Dropping queued encode job after shutdown");
        }

        processing.store(true, Ordering::SeqCst);
        job(cancelled).await;
        processing.store(false, Ordering::SeqCst);
        debug!("Encode job finished, {} pending", pending.load(Ordering::SeqCst));
    }

    info!("Encode queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_jobs_never_overlap_and_finish_in_order() {
        let queue = EncodeQueue::new(CancellationToken::new());
        let log: Arc<Mutex<Vec<(usize, Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let jobs: Vec<_> = (0..5)
            .map(|i| {
                let log = Arc::clone(&log);
                queue.enqueue(move || async move {
                    let started = Instant::now();
                    // Later jobs are shorter; order must still hold
                    tokio::time::sleep(Duration::from_millis(30 - i as u64 * 5)).await;
                    log.lock().push((i, started, Instant::now()));
                    Ok(i)
                })
            })
            .collect();
        assert!(queue.pending() >= 4);

        let handles: Vec<_> = jobs.into_iter().map(tokio::spawn).collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i);
        }

        let log = log.lock();
        let order: Vec<usize> = log.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for pair in log.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "jobs overlapped");
        }
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_the_queue() {
        let queue = EncodeQueue::new(CancellationToken::new());

        let failed = queue.enqueue(|| async {
            if true {
                panic!("encoder job exploded");
            }
            Ok(())
        });
        let next = queue.enqueue(|| async { Ok("still running") });

        assert!(matches!(failed.await, Err(EncodeError::TaskPanicked)));
        assert_eq!(next.await.unwrap(), "still running");
    }

    #[tokio::test]
    async fn test_errors_reach_the_caller() {
        let queue = EncodeQueue::new(CancellationToken::new());
        let result: Result<(), _> = queue
            .enqueue(|| async {
                Err(EncodeError::EncodingFailed {
                    code: Some(1),
                    diagnostics: "bad input".to_string(),
                })
            })
            .await;
        assert!(matches!(
            result,
            Err(EncodeError::EncodingFailed { code: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_queued_and_new_jobs() {
        let shutdown = CancellationToken::new();
        let queue = EncodeQueue::new(shutdown.clone());
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = queue.enqueue(move || async move {
            let _ = release_rx.await;
            Ok(1)
        });
        let queued = queue.enqueue(|| async { Ok(2) });

        // Let the worker pick up the first job
        while !queue.is_processing() {
            tokio::task::yield_now().await;
        }
        shutdown.cancel();
        let _ = release_tx.send(());

        assert_eq!(running.await.unwrap(), 1);
        assert!(matches!(queued.await, Err(EncodeError::Cancelled)));
        assert!(matches!(
            queue.enqueue(|| async { Ok(3) }).await,
            Err(EncodeError::Cancelled)
        ));
    }
}
