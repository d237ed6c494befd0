use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, thread, time::{Duration, Instant}};
use thiserror::Error;
use uuid::Uuid;

mod loader;

pub use loader::{is_remote, FsLoader, Loader, Picture};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("worker stopped")]
    Stopped,
    #[error("job canceled")]
    Canceled,
    #[error("job timed out after {0:?}")]
    TimedOut(Duration),
    #[error("job has no sources")]
    NoSources,
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    Frame,
    WebImages,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub sources: Vec<String>,
    /// Upper bound on the whole job, measured from `enqueue`.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl JobSpec {
    pub fn frame(source: impl Into<String>) -> Self {
        Self { kind: JobKind::Frame, sources: vec![source.into()], timeout: None }
    }

    pub fn web_images(sources: Vec<String>, timeout: Duration) -> Self {
        Self { kind: JobKind::WebImages, sources, timeout: Some(timeout) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Pending,
    Running,
    Progress(f32),
    Done,
    Failed(String),
    Canceled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of a preload job. Failed sources are listed, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preloaded {
    pub kind: JobKind,
    pub loaded: Vec<Picture>,
    pub failed: Vec<SourceFailure>,
}

type OnDone = Box<dyn FnOnce(Result<Preloaded, JobError>) + Send>;

struct Entry {
    kind: JobKind,
    deadline: Option<(Instant, Duration)>,
    on_done: OnDone,
}

struct Shared {
    queue: Mutex<VecDeque<(String, JobSpec)>>,
    registry: Mutex<HashMap<String, Entry>>,
    stopped: AtomicBool,
    tx_events: Sender<JobEvent>,
    loader: Arc<dyn Loader>,
}

impl Shared {
    fn is_live(&self, id: &str) -> bool { self.registry.lock().contains_key(id) }

    fn emit(&self, id: &str, kind: JobKind, status: JobStatus) {
        let _ = self.tx_events.send(JobEvent { id: id.to_string(), kind, status });
    }

    // The first caller for an id wins; later results are dropped.
    fn finish(&self, id: &str, result: Result<Preloaded, JobError>) -> bool {
        let Some(entry) = self.registry.lock().remove(id) else { return false };
        let status = match &result {
            Ok(_) => JobStatus::Done,
            Err(JobError::Canceled) => JobStatus::Canceled,
            Err(JobError::TimedOut(_)) => JobStatus::TimedOut,
            Err(e) => JobStatus::Failed(e.to_string()),
        };
        self.emit(id, entry.kind, status);
        (entry.on_done)(result);
        true
    }

    fn expire(&self, now: Instant) {
        let expired: Vec<(String, Duration)> = self
            .registry
            .lock()
            .iter()
            .filter_map(|(id, e)| e.deadline.filter(|(at, _)| *at <= now).map(|(_, t)| (id.clone(), t)))
            .collect();
        for (id, timeout) in expired {
            if self.finish(&id, Err(JobError::TimedOut(timeout))) {
                tracing::debug!("[jobs] {id} timed out after {timeout:?}");
            }
        }
    }

    fn stop_all(&self) {
        self.stopped.store(true, Ordering::Release);
        let ids: Vec<String> = self.registry.lock().keys().cloned().collect();
        for id in ids {
            self.finish(&id, Err(JobError::Stopped));
        }
    }
}

#[derive(Clone)]
pub struct JobsHandle {
    shared: Arc<Shared>,
    tx_submit: Sender<(String, JobSpec)>,
    tx_cancel: Sender<String>,
    pub rx_events: Receiver<JobEvent>,
}

pub struct JobsRuntime;

impl JobsRuntime {
    /// Starts the feeder thread and `num_workers` preload workers (at least one).
    /// Everything shuts down once the last handle is dropped.
    pub fn start(loader: impl Loader, num_workers: usize) -> JobsHandle {
        let (tx_submit, rx_submit) = unbounded::<(String, JobSpec)>();
        let (tx_cancel, rx_cancel) = unbounded::<String>();
        let (tx_events, rx_events) = unbounded::<JobEvent>();
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            registry: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            tx_events,
            loader: Arc::new(loader),
        });

        Self::spawn_workers(num_workers.max(1), &shared);

        // Feeder thread
        {
            let shared = shared.clone();
            thread::spawn(move || {
                loop {
                    crossbeam_channel::select! {
                        recv(rx_submit) -> msg => {
                            if let Ok((id, spec)) = msg {
                                if !shared.is_live(&id) { continue; }
                                shared.emit(&id, spec.kind, JobStatus::Pending);
                                shared.queue.lock().push_back((id, spec));
                            }
                            else { break; }
                        }
                        recv(rx_cancel) -> msg => {
                            if let Ok(id) = msg {
                                if shared.finish(&id, Err(JobError::Canceled)) { tracing::debug!("[jobs] {id} canceled"); }
                            }
                            else { break; }
                        }
                        default(Duration::from_millis(10)) => {}
                    }
                    shared.expire(Instant::now());
                }
                shared.stop_all();
            });
        }

        JobsHandle { shared, tx_submit, tx_cancel, rx_events }
    }

    fn spawn_workers(n: usize, shared: &Arc<Shared>) {
        for _ in 0..n {
            let shared = shared.clone();
            thread::spawn(move || loop {
                let job = shared.queue.lock().pop_front();
                let Some((id, spec)) = job else {
                    if shared.stopped.load(Ordering::Acquire) { break; }
                    thread::sleep(Duration::from_millis(10));
                    continue;
                };
                if !shared.is_live(&id) { continue; }
                shared.emit(&id, spec.kind, JobStatus::Running);
                if let Some(result) = preload(&shared, &id, &spec) {
                    if !shared.finish(&id, result) {
                        tracing::trace!("[jobs] late result for {id} discarded");
                    }
                }
            });
        }
    }
}

fn preload(shared: &Shared, id: &str, spec: &JobSpec) -> Option<Result<Preloaded, JobError>> {
    if spec.sources.is_empty() {
        return Some(Err(JobError::NoSources));
    }
    let total = spec.sources.len();
    let mut loaded = Vec::new();
    let mut failed = Vec::new();
    for (i, source) in spec.sources.iter().enumerate() {
        // Canceled or timed out meanwhile.
        if !shared.is_live(id) { return None; }
        match shared.loader.load(source) {
            Ok(picture) => loaded.push(picture),
            Err(e) => {
                tracing::debug!("[jobs] {source}: {e}");
                failed.push(SourceFailure { source: source.clone(), error: e.to_string() });
            }
        }
        shared.emit(id, spec.kind, JobStatus::Progress((i + 1) as f32 / total as f32));
    }
    Some(Ok(Preloaded { kind: spec.kind, loaded, failed }))
}

impl JobsHandle {
    /// Queues a preload job. `on_done` runs exactly once, on a runtime thread.
    pub fn enqueue<F>(&self, spec: JobSpec, on_done: F) -> String
    where
        F: FnOnce(Result<Preloaded, JobError>) + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let deadline = spec.timeout.map(|t| (Instant::now() + t, t));
        self.shared.registry.lock().insert(id.clone(), Entry { kind: spec.kind, deadline, on_done: Box::new(on_done) });
        if self.tx_submit.send((id.clone(), spec)).is_err() {
            self.shared.finish(&id, Err(JobError::Stopped));
        }
        id
    }

    pub fn cancel_job(&self, job_id: &str) {
        let _ = self.tx_cancel.send(job_id.to_string());
    }

    /// Jobs whose `on_done` has not run yet.
    pub fn in_flight(&self) -> usize { self.shared.registry.lock().len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct SlowLoader(Duration);

    impl Loader for SlowLoader {
        fn load(&self, source: &str) -> Result<Picture, JobError> {
            thread::sleep(self.0);
            Ok(Picture { source: source.to_string(), path: PathBuf::from(source), bytes: 1 })
        }
    }

    fn collect(handle: &JobsHandle, spec: JobSpec) -> (String, Receiver<Result<Preloaded, JobError>>) {
        let (tx, rx) = unbounded();
        let id = handle.enqueue(spec, move |r| { let _ = tx.send(r); });
        (id, rx)
    }

    #[test]
    fn test_preload_records_source_failures() {
        let root = std::env::temp_dir().join(format!("jobs-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(root.join("v1")).unwrap();
        std::fs::write(root.join("v1/minivid0001.png"), b"png").unwrap();

        let handle = JobsRuntime::start(FsLoader::new(&root), 2);
        let sources = vec!["v1/minivid0001.png".to_string(), "v1/missing.png".to_string(), "https://example.org/x.png".to_string()];
        let (id, rx) = collect(&handle, JobSpec::web_images(sources, Duration::from_secs(5)));
        let preloaded = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(preloaded.loaded.len(), 1);
        assert_eq!(preloaded.loaded[0].bytes, 3);
        assert_eq!(preloaded.failed.len(), 2);
        assert_eq!(preloaded.failed[1].source, "https://example.org/x.png");

        let statuses: Vec<JobStatus> = handle.rx_events.try_iter().filter(|e| e.id == id).map(|e| e.status).collect();
        assert_eq!(statuses.first(), Some(&JobStatus::Pending));
        assert_eq!(statuses.last(), Some(&JobStatus::Done));
        assert_eq!(statuses.iter().filter(|s| matches!(s, JobStatus::Progress(_))).count(), 3);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_timeout_completes_once() {
        let handle = JobsRuntime::start(SlowLoader(Duration::from_millis(300)), 1);
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded();
        let counter = calls.clone();
        let spec = JobSpec { kind: JobKind::WebImages, sources: vec!["a".into()], timeout: Some(Duration::from_millis(30)) };
        handle.enqueue(spec, move |r| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(r);
        });
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(result, Err(JobError::TimedOut(t)) if t == Duration::from_millis(30)));
        thread::sleep(Duration::from_millis(500));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.in_flight(), 0);
        let statuses: Vec<JobStatus> = handle.rx_events.try_iter().map(|e| e.status).collect();
        assert!(statuses.contains(&JobStatus::TimedOut));
        assert!(!statuses.contains(&JobStatus::Done));
    }

    #[test]
    fn test_cancel_queued_job() {
        let handle = JobsRuntime::start(SlowLoader(Duration::from_millis(200)), 1);
        let (_first, first_rx) = collect(&handle, JobSpec::frame("a"));
        let (second, second_rx) = collect(&handle, JobSpec::frame("b"));
        handle.cancel_job(&second);
        assert!(matches!(second_rx.recv_timeout(Duration::from_secs(2)).unwrap(), Err(JobError::Canceled)));
        let first = first_rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(first.loaded[0].source, "a");
    }

    #[test]
    fn test_empty_job_fails() {
        let handle = JobsRuntime::start(SlowLoader(Duration::ZERO), 1);
        let (_id, rx) = collect(&handle, JobSpec { kind: JobKind::Frame, sources: vec![], timeout: None });
        assert!(matches!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Err(JobError::NoSources)));
    }
}
