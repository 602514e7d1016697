use super::registry::{ChangeCallback, Registry, WatchedFileInfo, WatchedFileState};
use crate::error::{DevpipeError, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the queue between the notification thread and the dispatcher
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How long `stop()` waits for the dispatcher to drain
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Live notification subscription
struct Subscription {
    watcher: RecommendedWatcher,
    dispatcher: JoinHandle<()>,
}

/// Incremental tailing of registered files.
///
/// Change notifications for each file's parent directory are produced by a
/// `notify` watcher into a bounded channel. A dispatcher task takes each event
/// to the blocking pool, where the new lines of the affected file are read and
/// handed to that file's callback.
pub struct FileTailer {
    registry: Arc<Mutex<Registry>>,
    subscription: Mutex<Option<Subscription>>,
    event_capacity: usize,
}

impl FileTailer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a tailer whose event queue holds at most `event_capacity` events
    pub fn with_capacity(event_capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            subscription: Mutex::new(None),
            event_capacity: event_capacity.max(1),
        }
    }

    /// Start delivering change notifications.
    ///
    /// Must be called from within a Tokio runtime. Calling it while already
    /// running is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut subscription = self.lock_subscription();
        if subscription.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DevpipeError::WatcherError("start requires a Tokio runtime".to_string())
        })?;

        let (tx, rx) = mpsc::channel(self.event_capacity);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Runs on the notify thread; blocks when the dispatcher falls behind
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )
        .map_err(|e| DevpipeError::WatcherError(format!("Failed to create watcher: {}", e)))?;

        // The registry lock is never held across watcher calls; the dispatcher needs it
        let directories: Vec<PathBuf> = self.lock_registry().directories().cloned().collect();
        for dir in &directories {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    DevpipeError::WatcherError(format!("Failed to watch {}: {}", dir.display(), e))
                })?;
        }

        let dispatcher = runtime.spawn(dispatch(rx, Arc::clone(&self.registry)));
        *subscription = Some(Subscription {
            watcher,
            dispatcher,
        });

        info!("File tailer started");
        Ok(())
    }

    /// Stop notifications, drain pending events and clear all registrations
    pub async fn stop(&self) {
        let subscription = self.lock_subscription().take();

        if let Some(Subscription {
            watcher,
            mut dispatcher,
        }) = subscription
        {
            // Dropping the watcher releases the OS handles and closes the channel
            drop(watcher);

            if tokio::time::timeout(DRAIN_TIMEOUT, &mut dispatcher)
                .await
                .is_err()
            {
                warn!("File tailer dispatcher did not drain in time, aborting");
                dispatcher.abort();
            }
            info!("File tailer stopped");
        }

        self.lock_registry().clear();
    }

    pub fn is_active(&self) -> bool {
        self.lock_subscription().is_some()
    }

    /// Register a file for tailing.
    ///
    /// Only content appended after registration is reported. The parent
    /// directory is watched immediately when the tailer is running.
    ///
    /// # Returns
    /// * `Ok(())` - File registered
    /// * `Err(DevpipeError)` - File missing, not a regular file, already registered,
    ///   or its directory could not be watched
    pub fn add_file<P: AsRef<Path>>(&self, path: P, on_change: Option<ChangeCallback>) -> Result<()> {
        let path = path.as_ref();
        let mut subscription = self.lock_subscription();
        let new_dir = self.lock_registry().add(path, on_change)?;

        if let (Some(dir), Some(sub)) = (new_dir, subscription.as_mut()) {
            if let Err(e) = sub.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                self.lock_registry().remove(path);
                return Err(DevpipeError::WatcherError(format!(
                    "Failed to watch {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        debug!("Tailing {}", path.display());
        Ok(())
    }

    /// Deregister a file; `false` if it was not registered
    pub fn remove_file<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        let mut subscription = self.lock_subscription();
        let removed = self.lock_registry().remove(path);

        match removed {
            None => false,
            Some(released_dir) => {
                if let (Some(dir), Some(sub)) = (released_dir, subscription.as_mut()) {
                    if let Err(e) = sub.watcher.unwatch(&dir) {
                        warn!("Failed to unwatch {}: {}", dir.display(), e);
                    }
                }
                true
            }
        }
    }

    /// Lines appended to `path` since the last read.
    ///
    /// Read failures are logged and reported as no new content.
    pub fn get_new_content<P: AsRef<Path>>(&self, path: P) -> Vec<String> {
        let path = path.as_ref();
        let mut registry = self.lock_registry();

        if registry.state(path).is_none() {
            return Vec::new();
        }

        match registry.read_new_lines(path) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Current read position of a registered file
    pub fn file_state<P: AsRef<Path>>(&self, path: P) -> Option<WatchedFileState> {
        self.lock_registry().state(path.as_ref())
    }

    pub fn watched_files(&self) -> Vec<WatchedFileInfo> {
        self.lock_registry().infos()
    }

    pub fn watched_count(&self) -> usize {
        self.lock_registry().len()
    }

    fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FileTailer {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Consume change events until the channel closes
async fn dispatch(
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    registry: Arc<Mutex<Registry>>,
) {
    while let Some(res) = rx.recv().await {
        match res {
            Ok(event) => {
                if !is_content_change(&event) {
                    continue;
                }
                // File reads and callbacks block, so they run off the async workers.
                // Awaiting each batch keeps lines in notification order.
                let registry = Arc::clone(&registry);
                let batch = tokio::task::spawn_blocking(move || {
                    for path in &event.paths {
                        handle_change(&registry, path);
                    }
                });
                if let Err(e) = batch.await {
                    warn!("File change handler failed: {}", e);
                }
            }
            Err(e) => warn!("File watcher error: {}", e),
        }
    }
    debug!("File tailer dispatcher exited");
}

/// Read the new lines of one changed file and invoke its callback outside the lock
fn handle_change(registry: &Mutex<Registry>, path: &Path) {
    let (callback, lines) = {
        let mut registry = lock(registry);
        if !registry.contains(path) {
            return;
        }
        let Some(callback) = registry.callback(path) else {
            return;
        };
        match registry.read_new_lines(path) {
            Ok(lines) => (callback, lines),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return;
            }
        }
    };

    if !lines.is_empty() {
        callback(path, &lines);
    }
}

fn is_content_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
}
