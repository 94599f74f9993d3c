use crate::errors::AppResult;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

type SaveExecutor = Arc<dyn Fn() -> AppResult<()> + Send + Sync>;

/// `Loading` turns every save into a no-op; the move to `Ready` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Loading,
    Ready,
}

#[derive(Debug, Default)]
struct DebounceState {
    deadline: Option<Instant>,
    started: bool,
}

#[derive(Clone)]
pub struct SaveScheduler {
    state: Arc<Mutex<DebounceState>>,
    ready: Arc<AtomicBool>,
    notify: Arc<Notify>,
    executor: Arc<RwLock<Option<SaveExecutor>>>,
    save_lock: Arc<Mutex<()>>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    debounce: Duration,
}

impl SaveScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(DebounceState::default())),
            ready: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            executor: Arc::new(RwLock::new(None)),
            save_lock: Arc::new(Mutex::new(())),
            completed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            debounce,
        }
    }

    pub fn set_executor(&self, executor: SaveExecutor) {
        let mut writer = self.executor.write().expect("save executor write lock");
        *writer = Some(executor);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.ready.load(Ordering::Acquire) {
            Lifecycle::Ready
        } else {
            Lifecycle::Loading
        }
    }

    pub fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            tracing::debug!("save scheduler ready");
        }
    }

    /// Spawns the debounce loop on the current tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        {
            let mut state = self.state.lock().expect("save scheduler state lock");
            if state.started {
                return;
            }
            state.started = true;
        }
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
    }

    /// Restarts the single-shot debounce timer.
    pub fn request_debounced_save(&self) {
        if self.lifecycle() == Lifecycle::Loading {
            tracing::debug!("debounced save suppressed while loading");
            return;
        }
        {
            let mut state = self.state.lock().expect("save scheduler state lock");
            state.deadline = Some(Instant::now() + self.debounce);
        }
        self.notify.notify_one();
    }

    /// Cancels any pending debounced save and writes immediately.
    pub fn save_now(&self) -> AppResult<()> {
        if self.lifecycle() == Lifecycle::Loading {
            tracing::debug!("immediate save suppressed while loading");
            return Ok(());
        }
        {
            let mut state = self.state.lock().expect("save scheduler state lock");
            state.deadline = None;
        }
        self.execute("immediate")
    }

    pub fn has_pending_save(&self) -> bool {
        self.state.lock().expect("save scheduler state lock").deadline.is_some()
    }

    pub fn completed_saves(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn failed_saves(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    async fn run_loop(self) {
        loop {
            let deadline = self.state.lock().expect("save scheduler state lock").deadline;
            let Some(at) = deadline else {
                self.notify.notified().await;
                continue;
            };
            tokio::select! {
                _ = tokio::time::sleep_until(at) => {
                    if self.take_if_due(at) {
                        let _ = self.execute("debounced");
                    }
                }
                _ = self.notify.notified() => {}
            }
        }
    }

    fn take_if_due(&self, at: Instant) -> bool {
        let mut state = self.state.lock().expect("save scheduler state lock");
        if state.deadline == Some(at) {
            state.deadline = None;
            true
        } else {
            false
        }
    }

    fn execute(&self, reason: &'static str) -> AppResult<()> {
        let executor = self.executor.read().expect("save executor read lock").clone();
        let Some(executor) = executor else {
            tracing::debug!(reason, "no save executor registered");
            return Ok(());
        };
        let _guard = self.save_lock.lock().expect("save lock");
        match executor() {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(reason, "settings saved");
                Ok(())
            }
            Err(error) => {
                self.failed.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(reason, error = %error, "settings save failed");
                Err(error)
            }
        }
    }
}
