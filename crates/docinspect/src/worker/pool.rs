use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::WorkerError;
use crate::pipeline::Pipeline;
use crate::worker::job::{Job, JobResult};

/// Something that accepts pipeline jobs. Intake depends on this rather than
/// on the pool itself.
pub trait JobSink: Send + Sync {
    /// Queues a job, waiting for room while the queue is full. Fails only
    /// once the sink no longer accepts work.
    fn submit(&self, job: Job) -> Result<(), WorkerError>;
}

/// Point-in-time counters for the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct WorkerPool {
    job_sender: Sender<Job>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Starts `worker_count` threads sharing one pipeline. The job queue
    /// holds `2 * worker_count` entries; beyond that `submit` blocks and
    /// `try_submit` reports [`WorkerError::QueueFull`].
    pub fn new(pipeline: Arc<Pipeline>, worker_count: usize) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed("worker_count must be > 0".to_string()));
        }
        let (job_sender, job_receiver) = bounded::<Job>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<JobResult>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_pipeline = Arc::clone(&pipeline);
            let worker_counters = Arc::clone(&counters);

            let handle = thread::Builder::new()
                .name(format!("inspect-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        worker_pipeline,
                        worker_counters,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
            counters,
        })
    }

    /// Queues a job without blocking.
    pub fn try_submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull,
            TrySendError::Disconnected(_) => WorkerError::ChannelClosed,
        })?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    /// A handle on the completion channel, for draining results elsewhere.
    pub fn results(&self) -> Receiver<JobResult> {
        self.result_receiver.clone()
    }

    pub fn stats(&self) -> PoolStats {
        let submitted = self.counters.submitted.load(Ordering::Relaxed);
        let completed = self.counters.completed.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        PoolStats {
            submitted,
            completed,
            failed,
            in_flight: submitted.saturating_sub(completed + failed),
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl JobSink for WorkerPool {
    fn submit(&self, job: Job) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<Job>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    pipeline: Arc<Pipeline>,
    counters: Arc<Counters>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job) => {
                debug!("Worker {} processing document {}", worker_id, job.document_id);

                let fallback = job.clone();
                let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(job)))
                .unwrap_or_else(|_| {
                    error!(
                        "Worker {} panicked while processing document {}",
                        worker_id, fallback.document_id
                    );
                    pipeline.abandon(&fallback);
                    JobResult::failure(&fallback, "pipeline panicked".to_string())
                });

                let counter = if result.success {
                    &counters.completed
                } else {
                    &counters.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);

                if let Err(e) = result_sender.send(result) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StubAnalyzer;
    use crate::db::{document_repo, session_repo, Database, DocumentStatus, SessionStatus};
    use crate::detect::test_support::ScriptedDetector;
    use crate::detect::Category;
    use crate::extract::StubExtractor;
    use crate::pipeline::{Adapters, PipelineConfig};
    use crate::raster::test_support::{blank_pdf, BlankRenderer};
    use crate::storage::MemoryStore;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    fn create_test_pipeline(work_root: &Path, db: &Database, rt: &Runtime) -> Arc<Pipeline> {
        let config = PipelineConfig {
            work_root: work_root.to_path_buf(),
            dpi: 72,
            threshold: 0.25,
            upload_concurrency: 2,
            analysis_enabled: false,
            extraction_timeout: Duration::from_secs(5),
            analysis_timeout: Duration::from_secs(5),
        };
        let adapters = Adapters {
            renderer: Arc::new(BlankRenderer {
                width: 40,
                height: 40,
            }),
            qr: ScriptedDetector::empty(Category::Qr),
            signature: ScriptedDetector::empty(Category::Signature),
            stamp: ScriptedDetector::empty(Category::Stamp),
            store: Arc::new(MemoryStore::new("pool")),
            extractor: Arc::new(StubExtractor),
            analyzer: Arc::new(StubAnalyzer),
        };
        Arc::new(Pipeline::new(
            Arc::new(config),
            db.clone(),
            adapters,
            rt.handle().clone(),
        ))
    }

    fn write_jobs(tmp: &Path, db: &Database, contents: &[&[u8]]) -> Vec<Job> {
        let names: Vec<String> = (0..contents.len()).map(|i| format!("doc{}.pdf", i)).collect();
        let (session, docs) = session_repo::create_with_documents(db, &names).unwrap();
        docs.iter()
            .zip(contents)
            .map(|(doc, bytes)| {
                let path = tmp.join(format!("{}.pdf", doc.id));
                std::fs::write(&path, bytes).unwrap();
                Job::new(session.id, doc.id, path, doc.original_name.clone())
            })
            .collect()
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let rt = Runtime::new().unwrap();
        let pipeline = create_test_pipeline(temp_dir.path(), &db, &rt);

        assert!(matches!(
            WorkerPool::new(pipeline, 0),
            Err(WorkerError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_worker_pool_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let rt = Runtime::new().unwrap();
        let pool = WorkerPool::new(create_test_pipeline(temp_dir.path(), &db, &rt), 2).unwrap();

        assert!(!pool.is_shutdown());
        assert_eq!(pool.stats(), PoolStats::default());

        pool.shutdown();
        assert!(pool.is_shutdown());

        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let rt = Runtime::new().unwrap();
        let pool = WorkerPool::new(create_test_pipeline(temp_dir.path(), &db, &rt), 1).unwrap();
        let job = write_jobs(temp_dir.path(), &db, &[b"x"]).remove(0);

        pool.shutdown();
        assert!(matches!(pool.submit(job.clone()), Err(WorkerError::ChannelClosed)));
        assert!(matches!(pool.try_submit(job), Err(WorkerError::ChannelClosed)));
        pool.wait();
    }

    #[test]
    fn test_jobs_complete_and_are_counted() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let rt = Runtime::new().unwrap();
        let pool = WorkerPool::new(create_test_pipeline(temp_dir.path(), &db, &rt), 2).unwrap();

        let good = blank_pdf(1);
        let jobs = write_jobs(temp_dir.path(), &db, &[&good, &good, b"not a pdf"]);
        let session_id = jobs[0].session_id;
        for job in jobs.clone() {
            pool.submit(job).unwrap();
        }

        let mut results: Vec<JobResult> = (0..3).map(|_| pool.recv_result().unwrap()).collect();
        results.sort_by_key(|r| r.document_id);

        assert!(results[0].success, "{:?}", results[0].error);
        assert!(results[1].success, "{:?}", results[1].error);
        assert!(!results[2].success);

        let stats = pool.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);

        let failed = document_repo::find_by_id(&db, jobs[2].document_id).unwrap().unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        let session = session_repo::find_by_id(&db, session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);

        pool.shutdown();
        pool.wait();
    }
}
