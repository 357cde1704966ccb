// Live-reload scheduler: owns the last valid message table and rebuilds it
// in the background.
//
// Playback only ever reads `snapshot()`, a lock-free `ArcSwap` load, so the
// delivery callback never blocks on a rebuild. Rebuilds run on one worker
// thread:
//
// - `request_rebuild` stores the request in a single pending slot, bumping
//   a generation counter. A request arriving while another is queued
//   replaces it; nothing queues behind the worker.
// - The worker takes the pending request, loads and compiles it, and only
//   publishes the result if its generation is still the newest. A
//   superseded result is dropped and the worker moves on to the newer
//   request.
// - A failed rebuild never touches the published table. The failure is
//   logged once per distinct message (`ErrorReporter`); a success clears
//   the suppression so the next failure is reported again. A panic while
//   loading or compiling counts as a failed rebuild (`Error::Aborted`), so
//   the worker outlives it.
// - The generation check and the store happen under the reporter lock, so
//   an older build can never overwrite a newer one that settled first.
//
// At most one worker is alive at a time, guarded by `running`. The worker
// drops `running` only after seeing an empty pending slot, then re-checks
// the slot so a request stored in that window is not stranded.
//
// The very first load has no table to fall back to, so `Scheduler::load`
// returns its error instead of absorbing it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::player::BuildMode;
use crate::source::SongSource;
use crate::table::MessageTable;

/// A published, fully built table with the song facts playback needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub table: MessageTable,
    pub tempo_bpm: u16,
    /// Tick just past the last pattern instance.
    pub length_ticks: u32,
}

/// Compile `source` into a complete snapshot built from tick 0.
pub fn compile_snapshot(source: &SongSource, config: &EngineConfig) -> Result<Snapshot> {
    let mut composition = source.compile(config)?;
    let table = MessageTable::build(&mut composition, 0, BuildMode::Playback)?;
    Ok(Snapshot {
        table,
        tempo_bpm: composition.tempo_bpm,
        length_ticks: composition.song.length_ticks(),
    })
}

/// Logs rebuild failures, suppressing consecutive repeats of the same text.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    last: Option<String>,
    reported: u64,
}

impl ErrorReporter {
    /// Report `err` unless it matches the previous failure. Returns whether
    /// it was logged.
    pub fn report(&mut self, err: &Error) -> bool {
        let text = err.to_string();
        if self.last.as_deref() == Some(text.as_str()) {
            debug!(error = %text, "rebuild still failing");
            return false;
        }
        error!(error = %text, "rebuild failed, keeping last valid table");
        self.last = Some(text);
        self.reported += 1;
        true
    }

    /// Forget the last failure after a successful rebuild.
    pub fn clear(&mut self) {
        if self.last.take().is_some() {
            info!("rebuild recovered");
        }
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// How many failures were actually logged.
    pub fn reported(&self) -> u64 {
        self.reported
    }
}

type Loader = Box<dyn FnOnce() -> Result<SongSource> + Send>;

struct Request {
    generation: u64,
    loader: Loader,
}

struct Shared {
    config: EngineConfig,
    valid: ArcSwap<Snapshot>,
    /// Generation of the newest request.
    generation: AtomicU64,
    pending: Mutex<Option<Request>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    reporter: Mutex<ErrorReporter>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Publish `result` unless `generation` has been superseded. Returns
    /// whether a new table was published.
    fn settle(&self, generation: u64, result: Result<Snapshot>) -> bool {
        let mut reporter = lock(&self.reporter);
        if generation != self.generation.load(Ordering::SeqCst) {
            debug!(generation, "discarding superseded rebuild");
            return false;
        }
        match result {
            Ok(snapshot) => {
                info!(
                    generation,
                    messages = snapshot.table.len(),
                    "published rebuilt table"
                );
                self.valid.store(Arc::new(snapshot));
                reporter.clear();
                true
            }
            Err(e) => {
                reporter.report(&e);
                false
            }
        }
    }
}

/// Run `build`, turning a panic into `Error::Aborted`.
fn guarded<F>(build: F) -> Result<Snapshot>
where
    F: FnOnce() -> Result<Snapshot>,
{
    panic::catch_unwind(AssertUnwindSafe(build))
        .unwrap_or_else(|payload| Err(Error::Aborted(panic_text(payload.as_ref()))))
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic while rebuilding".to_string()
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let request = lock(&shared.pending).take();
        let Some(Request { generation, loader }) = request else {
            shared.running.store(false, Ordering::SeqCst);
            if lock(&shared.pending).is_none() || shared.running.swap(true, Ordering::SeqCst) {
                return;
            }
            continue;
        };
        debug!(generation, "rebuilding");
        let config = &shared.config;
        let result =
            guarded(move || loader().and_then(|source| compile_snapshot(&source, config)));
        shared.settle(generation, result);
    }
}

/// Holds the valid table and coordinates background rebuilds. Cloning
/// shares the same state.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Compile the initial table. Any failure here is returned.
    pub fn load(source: &SongSource, config: EngineConfig) -> Result<Self> {
        let snapshot = compile_snapshot(source, &config)?;
        info!(messages = snapshot.table.len(), "loaded initial table");
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                valid: ArcSwap::from_pointee(snapshot),
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                reporter: Mutex::new(ErrorReporter::default()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// The current valid snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.valid.load_full()
    }

    /// Queue a background rebuild from an already loaded source.
    pub fn request_rebuild(&self, source: SongSource) {
        self.request_rebuild_with(move || Ok(source));
    }

    /// Queue a background rebuild whose source is produced by `loader` on
    /// the worker thread, replacing any request not yet started.
    pub fn request_rebuild_with<F>(&self, loader: F)
    where
        F: FnOnce() -> Result<SongSource> + Send + 'static,
    {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let superseded = lock(&self.shared.pending)
            .replace(Request {
                generation,
                loader: Box::new(loader),
            })
            .is_some();
        if superseded {
            debug!(generation, "superseded queued rebuild");
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("tickgrid-rebuild".into())
            .spawn(move || run_worker(shared));
        match spawned {
            Ok(handle) => *lock(&self.shared.worker) = Some(handle),
            Err(e) => {
                warn!(error = %e, "cannot spawn rebuild worker, rebuilding inline");
                run_worker(Arc::clone(&self.shared));
            }
        }
    }

    /// Rebuild synchronously on the calling thread. Supersedes any
    /// background request in flight. Returns whether a new table was
    /// published; failures are reported like background ones.
    pub fn rebuild_now(&self, source: &SongSource) -> bool {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = guarded(|| compile_snapshot(source, &self.shared.config));
        self.shared.settle(generation, result)
    }

    /// Block until no rebuild is queued or running.
    pub fn wait_idle(&self) {
        loop {
            let handle = lock(&self.shared.worker).take();
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        warn!("rebuild worker panicked");
                        self.shared.running.store(false, Ordering::SeqCst);
                    }
                }
                None if self.shared.running.load(Ordering::SeqCst) => thread::yield_now(),
                None => return,
            }
        }
    }

    /// Text of the failure currently being suppressed, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.reporter).last().map(str::to_string)
    }

    /// Number of rebuild failures logged so far.
    pub fn reported_errors(&self) -> u64 {
        lock(&self.shared.reporter).reported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;

    #[test]
    fn test_reporter_suppresses_repeats() {
        let mut reporter = ErrorReporter::default();
        let a: Error = FormatError::BlankDownbeat { meas: " |I | | ".into() }.into();
        let b: Error = FormatError::UnbalancedBrackets { text: "[I".into() }.into();
        assert!(reporter.report(&a));
        assert!(!reporter.report(&a));
        assert!(reporter.report(&b));
        assert!(reporter.report(&a));
        reporter.clear();
        assert_eq!(reporter.last(), None);
        assert!(reporter.report(&a));
        assert_eq!(reporter.reported(), 4);
    }

    #[test]
    fn test_guarded_turns_panic_into_error() {
        let result = guarded(|| panic!("grid exploded"));
        match result {
            Err(Error::Aborted(text)) => assert_eq!(text, "grid exploded"),
            other => panic!("expected an aborted rebuild, got {other:?}"),
        }
    }
}
