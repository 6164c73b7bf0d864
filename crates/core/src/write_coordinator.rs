//! Write coordinator for debounced, per-key collection writes
//!
//! Mutations mark a storage key dirty together with the latest encoded
//! payload. Writes are coalesced per key and happen once the key has been
//! quiet for the debounce duration, or once the max debounce duration has
//! passed since the first unwritten change. Failed writes stay pending and are
//! retried with exponential backoff, so memory and storage converge once the
//! storage recovers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use storage::{KeyValueStore, Settings, StorageError};

/// Configuration for the write coordinator
#[derive(Debug, Clone)]
pub struct WriteCoordinatorConfig {
    /// Quiet period after the last change before a key is written
    pub debounce_duration: Duration,

    /// Maximum interval before forcing a write (even if still receiving changes)
    pub max_debounce_duration: Duration,

    /// Delay before the first retry; doubles on every further failure
    pub retry_base_delay: Duration,

    /// Ceiling for the retry delay
    pub retry_max_delay: Duration,

    /// Consecutive failures after which a key is reported as failed
    pub max_attempts: u32,

    /// Whether a background thread drives writes (if false, only `poll`/`flush`)
    pub enable_auto_save: bool,

    /// How often the background thread looks for due writes
    pub check_interval: Duration,
}

impl Default for WriteCoordinatorConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl WriteCoordinatorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            debounce_duration: settings.debounce(),
            max_debounce_duration: settings.max_debounce(),
            retry_base_delay: settings.retry_base(),
            retry_max_delay: settings.retry_max(),
            max_attempts: settings.max_attempts.max(1),
            enable_auto_save: true,
            check_interval: Duration::from_millis(100),
        }
    }

    /// Delay before the next attempt after `attempts` consecutive failures.
    fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1 << exponent).min(self.retry_max_delay)
    }
}

/// State tracking for one dirty key
#[derive(Debug)]
struct PendingWrite {
    payload: Vec<u8>,

    /// When the first unwritten change was marked
    first_marked_at: Instant,

    /// When the most recent change was marked
    last_marked_at: Instant,

    /// Bumped on every re-mark
    revision: u64,

    /// Consecutive failed attempts
    attempts: u32,

    /// Set while backing off after a failure
    retry_at: Option<Instant>,

    last_error: Option<String>,
}

impl PendingWrite {
    fn new(payload: Vec<u8>, now: Instant) -> Self {
        Self {
            payload,
            first_marked_at: now,
            last_marked_at: now,
            revision: 0,
            attempts: 0,
            retry_at: None,
            last_error: None,
        }
    }

    fn remark(&mut self, payload: Vec<u8>, now: Instant) {
        self.payload = payload;
        self.last_marked_at = now;
        self.revision += 1;
    }

    fn is_due(&self, now: Instant, config: &WriteCoordinatorConfig) -> bool {
        if let Some(retry_at) = self.retry_at {
            return now >= retry_at;
        }

        now.saturating_duration_since(self.last_marked_at) >= config.debounce_duration
            || now.saturating_duration_since(self.first_marked_at) >= config.max_debounce_duration
    }

    fn record_failure(
        &mut self,
        err: &StorageError,
        now: Instant,
        config: &WriteCoordinatorConfig,
    ) {
        self.attempts += 1;
        self.retry_at = Some(now + config.backoff(self.attempts));
        self.last_error = Some(err.to_string());
    }

    /// Storage accepted an older payload; the newer one waits for its own debounce.
    fn clear_failures(&mut self) {
        self.attempts = 0;
        self.retry_at = None;
        self.last_error = None;
    }
}

/// Snapshot of what has not reached storage yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStatus {
    /// Keys with unwritten changes
    pub pending: Vec<String>,

    /// Pending keys that exhausted their retry budget (still retried)
    pub failed: Vec<String>,

    pub last_error: Option<String>,
}

impl PersistStatus {
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Keys and payloads waiting for storage.
type Pending = BTreeMap<String, PendingWrite>;

struct Shared<S> {
    /// Held for the whole of a write pass, so passes never interleave.
    store: Mutex<S>,

    /// Held only briefly; `mark_dirty` never waits on storage I/O.
    pending: Mutex<Pending>,
}

impl<S: KeyValueStore> Shared<S> {
    /// Write every key selected by `due`. Returns (written, first error).
    ///
    /// Payloads are snapshotted under the pending lock and written with it
    /// released. A key re-marked while its write was in flight stays pending.
    fn write_where(
        &self,
        now: Instant,
        config: &WriteCoordinatorConfig,
        due: impl Fn(&PendingWrite) -> bool,
    ) -> (usize, Option<StorageError>) {
        let store = lock(&self.store);
        let batch: Vec<(String, u64, Vec<u8>)> = lock(&self.pending)
            .iter()
            .filter(|(_, write)| due(write))
            .map(|(key, write)| (key.clone(), write.revision, write.payload.clone()))
            .collect();

        let mut written = 0;
        let mut first_error = None;

        for (key, revision, payload) in batch {
            let result = store.set(&key, &payload);

            let mut pending = lock(&self.pending);
            let Some(write) = pending.get_mut(&key) else {
                continue;
            };

            match result {
                Ok(()) => {
                    if write.attempts > 0 {
                        log::info!("'{key}' written after {} failed attempt(s)", write.attempts);
                    }
                    if write.revision == revision {
                        pending.remove(&key);
                    } else {
                        write.clear_failures();
                    }
                    written += 1;
                }
                Err(err) => {
                    write.record_failure(&err, now, config);
                    if write.attempts == config.max_attempts {
                        log::error!(
                            "'{key}' failed {} times, in-memory state is ahead of storage: {err}",
                            write.attempts
                        );
                    } else {
                        log::warn!("write of '{key}' failed (attempt {}): {err}", write.attempts);
                    }
                    first_error.get_or_insert(err);
                }
            }
        }

        (written, first_error)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write coordinator that manages debounced per-key writes
///
/// Keeps the latest payload for each dirty key in memory and hands it to the
/// key-value store when due. Safe to share across threads; the optional
/// background thread only ever touches the shared state through its mutexes.
pub struct WriteCoordinator<S: KeyValueStore + Send + 'static> {
    /// Configuration
    config: WriteCoordinatorConfig,

    /// Store and pending writes
    shared: Arc<Shared<S>>,

    /// Flag to stop background thread
    should_stop: Arc<AtomicBool>,

    /// Background thread handle
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl<S: KeyValueStore + Send + 'static> WriteCoordinator<S> {
    /// Create a new write coordinator with default configuration
    pub fn new(store: S) -> Self {
        Self::with_config(store, WriteCoordinatorConfig::default())
    }

    /// Create a new write coordinator with custom configuration
    pub fn with_config(store: S, config: WriteCoordinatorConfig) -> Self {
        let shared =
            Arc::new(Shared { store: Mutex::new(store), pending: Mutex::new(BTreeMap::new()) });
        let should_stop = Arc::new(AtomicBool::new(false));

        let thread_handle = if config.enable_auto_save {
            Some(Self::spawn_background_thread(
                Arc::clone(&shared),
                Arc::clone(&should_stop),
                config.clone(),
            ))
        } else {
            None
        };

        Self { config, shared, should_stop, thread_handle }
    }

    /// Record the latest payload for `key`; the write is batched.
    pub fn mark_dirty(&self, key: &str, payload: Vec<u8>) {
        self.mark_dirty_at(key, payload, Instant::now());
    }

    fn mark_dirty_at(&self, key: &str, payload: Vec<u8>, now: Instant) {
        let mut pending = self.pending();
        match pending.get_mut(key) {
            Some(write) => write.remark(payload, now),
            None => {
                pending.insert(key.to_owned(), PendingWrite::new(payload, now));
            }
        }
    }

    /// Check if there are pending writes
    pub fn is_dirty(&self) -> bool {
        !self.pending().is_empty()
    }

    pub fn is_key_dirty(&self, key: &str) -> bool {
        self.pending().contains_key(key)
    }

    /// Write every key that is due at `now`. Returns how many were written.
    pub fn poll(&self, now: Instant) -> usize {
        let config = &self.config;
        let (written, _) = self.shared.write_where(now, config, |write| write.is_due(now, config));
        written
    }

    /// Force an immediate write of every pending key, ignoring debounce and backoff
    ///
    /// Returns the number of keys written, or the first error. Keys that fail
    /// stay pending.
    pub fn flush(&self) -> Result<usize, StorageError> {
        let now = Instant::now();
        let (written, error) = self.shared.write_where(now, &self.config, |_| true);

        match error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    pub fn status(&self) -> PersistStatus {
        let pending = self.pending();
        let mut status = PersistStatus::default();

        for (key, write) in pending.iter() {
            status.pending.push(key.clone());
            if write.attempts >= self.config.max_attempts {
                status.failed.push(key.clone());
            }
            if write.last_error.is_some() {
                status.last_error = write.last_error.clone();
            }
        }

        status
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.status().failed
    }

    /// Run `f` against the underlying store, after any write in progress.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.shared.store))
    }

    /// Get the current configuration
    pub fn config(&self) -> &WriteCoordinatorConfig {
        &self.config
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        lock(&self.shared.pending)
    }

    /// Spawn background thread for periodic writes
    fn spawn_background_thread(
        shared: Arc<Shared<S>>,
        should_stop: Arc<AtomicBool>,
        config: WriteCoordinatorConfig,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            while !should_stop.load(Ordering::Acquire) {
                let now = Instant::now();
                shared.write_where(now, &config, |write| write.is_due(now, &config));

                thread::sleep(config.check_interval);
            }
        })
    }
}

impl<S: KeyValueStore + Send + 'static> Drop for WriteCoordinator<S> {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        if let Err(err) = self.flush() {
            log::error!("final flush failed, unwritten annotation changes are lost: {err}");
        }
    }
}
