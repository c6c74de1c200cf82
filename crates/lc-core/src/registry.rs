//! Keyed registry of periodic tasks
//!
//! Tasks live in a `DashMap` behind `Arc`s. [`TaskRegistry::tick`] and
//! [`TaskRegistry::range`] work on a snapshot, so tasks may be registered or
//! removed (including by their own failure) while a tick is in progress.

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RegistryError, TaskError};
use crate::traits::Task;

/// Callback invoked when a task's `run_once` fails
pub type ErrorCallback<K> = Arc<dyn Fn(&K, &TaskError) + Send + Sync>;

/// Per-task registration options
pub struct TaskOptions<K> {
    /// Remove (and destroy) the task when `run_once` fails
    pub remove_on_error: bool,
    /// Called after a failure has been handled
    pub on_error: Option<ErrorCallback<K>>,
}

impl<K> TaskOptions<K> {
    /// Set the error callback
    pub fn on_error(mut self, callback: impl Fn(&K, &TaskError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Keep the task registered when it fails
    pub fn keep_on_error(mut self) -> Self {
        self.remove_on_error = false;
        self
    }
}

impl<K> Default for TaskOptions<K> {
    fn default() -> Self {
        Self {
            remove_on_error: true,
            on_error: None,
        }
    }
}

impl<K> Clone for TaskOptions<K> {
    fn clone(&self) -> Self {
        Self {
            remove_on_error: self.remove_on_error,
            on_error: self.on_error.clone(),
        }
    }
}

impl<K> fmt::Debug for TaskOptions<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("remove_on_error", &self.remove_on_error)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

struct Entry<K, T> {
    task: Arc<T>,
    options: TaskOptions<K>,
}

/// Registry of tasks keyed by `K`
pub struct TaskRegistry<K, T> {
    entries: DashMap<K, Entry<K, T>>,
}

impl<K, T> TaskRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Task,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Initialize `task` and register it under `key`.
    ///
    /// Nothing is registered if `init` fails. If `key` is taken the new task
    /// is destroyed and the existing one is left alone.
    pub async fn register(
        &self,
        key: K,
        task: T,
        options: TaskOptions<K>,
    ) -> Result<Arc<T>, RegistryError> {
        if self.entries.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(format!("{:?}", key)));
        }

        task.init().await.map_err(RegistryError::Init)?;
        let task = Arc::new(task);

        let inserted = match self.entries.entry(key) {
            MapEntry::Occupied(existing) => Err(format!("{:?}", existing.key())),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    task: task.clone(),
                    options,
                });
                Ok(())
            }
        };

        match inserted {
            Ok(()) => Ok(task),
            Err(key) => {
                task.destroy().await;
                Err(RegistryError::AlreadyRegistered(key))
            }
        }
    }

    /// Task registered under `key`
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        self.entries.get(key).map(|entry| entry.task.clone())
    }

    /// Check if `key` is registered
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no task is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered keys
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Visit every task until `visit` returns false
    pub fn range(&self, mut visit: impl FnMut(&K, &Arc<T>) -> bool) {
        for (key, task, _) in self.snapshot() {
            if !visit(&key, &task) {
                break;
            }
        }
    }

    /// Unregister and destroy the task under `key`
    pub async fn remove(&self, key: &K) -> Option<Arc<T>> {
        let removed = self.entries.remove(key);
        match removed {
            Some((_, entry)) => {
                entry.task.destroy().await;
                Some(entry.task)
            }
            None => None,
        }
    }

    /// Run every task once. Returns the number of failures.
    pub async fn tick(&self, cancel: &CancellationToken) -> usize {
        let mut failures = 0;

        for (key, task, options) in self.snapshot() {
            if cancel.is_cancelled() {
                break;
            }

            let Err(e) = task.run_once(cancel).await else {
                continue;
            };
            failures += 1;
            warn!("Task {:?} failed: {}", key, e);

            if options.remove_on_error {
                // Only remove the instance that failed, not a re-registration
                let removed = self
                    .entries
                    .remove_if(&key, |_, entry| Arc::ptr_eq(&entry.task, &task))
                    .is_some();
                if removed {
                    task.destroy().await;
                    debug!("Task {:?} removed", key);
                }
            }

            if let Some(callback) = &options.on_error {
                callback(&key, &e);
            }
        }

        failures
    }

    /// Unregister and destroy every task
    pub async fn clear(&self) {
        for key in self.keys() {
            self.remove(&key).await;
        }
    }

    fn snapshot(&self) -> Vec<(K, Arc<T>, TaskOptions<K>)> {
        self.entries
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.task.clone(),
                    entry.options.clone(),
                )
            })
            .collect()
    }
}

impl<K, T> Default for TaskRegistry<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Task,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        runs: AtomicUsize,
        destroyed: AtomicUsize,
        failing: AtomicBool,
        refuse_init: bool,
    }

    #[async_trait]
    impl Task for Arc<Probe> {
        async fn init(&self) -> Result<(), TaskError> {
            if self.refuse_init {
                return Err(TaskError::Init("refused".to_string()));
            }
            Ok(())
        }

        async fn run_once(&self, _cancel: &CancellationToken) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(TaskError::Init("tick failed".to_string()));
            }
            Ok(())
        }

        async fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_register_and_tick() {
        let registry = TaskRegistry::new();
        let a = Arc::new(Probe::default());
        let b = Arc::new(Probe::default());
        registry.register("a", a.clone(), TaskOptions::default()).await.unwrap();
        registry.register("b", b.clone(), TaskOptions::default()).await.unwrap();

        let failures = registry.tick(&CancellationToken::new()).await;

        assert_eq!(failures, 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_destroys_newcomer() {
        let registry = TaskRegistry::new();
        let first = Arc::new(Probe::default());
        let second = Arc::new(Probe::default());
        registry.register("a", first.clone(), TaskOptions::default()).await.unwrap();

        let result = registry.register("a", second.clone(), TaskOptions::default()).await;

        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.destroyed.load(Ordering::SeqCst), 0);
        let current = registry.get(&"a").unwrap();
        assert!(Arc::ptr_eq(&*current, &first));
    }

    #[tokio::test]
    async fn test_failed_init_registers_nothing() {
        let registry = TaskRegistry::new();
        let probe = Arc::new(Probe {
            refuse_init: true,
            ..Default::default()
        });

        let result = registry.register("a", probe, TaskOptions::default()).await;

        assert!(matches!(result, Err(RegistryError::Init(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_removes_destroys_and_reports_once() {
        let registry = TaskRegistry::new();
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = reports.clone();
        let options = TaskOptions::default().on_error(move |_key: &&str, _e| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let failing = Arc::new(Probe::default());
        failing.failing.store(true, Ordering::SeqCst);
        let healthy = Arc::new(Probe::default());
        registry.register("failing", failing.clone(), options.clone()).await.unwrap();
        registry.register("healthy", healthy.clone(), options).await.unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(registry.tick(&cancel).await, 1);
        assert_eq!(registry.tick(&cancel).await, 0);

        assert_eq!(reports.load(Ordering::SeqCst), 1);
        assert_eq!(failing.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(failing.runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.keys(), vec!["healthy"]);
    }

    #[tokio::test]
    async fn test_keep_on_error() {
        let registry = TaskRegistry::new();
        let probe = Arc::new(Probe::default());
        probe.failing.store(true, Ordering::SeqCst);
        registry
            .register("a", probe.clone(), TaskOptions::default().keep_on_error())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        registry.tick(&cancel).await;
        registry.tick(&cancel).await;

        assert!(registry.contains(&"a"));
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);
        assert_eq!(probe.destroyed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_range_stops_early_and_clear_destroys() {
        let registry = TaskRegistry::new();
        let probes: Vec<_> = (0..3).map(|_| Arc::new(Probe::default())).collect();
        for (i, probe) in probes.iter().enumerate() {
            registry.register(i, probe.clone(), TaskOptions::default()).await.unwrap();
        }

        let mut visited = 0;
        registry.range(|_, _| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);

        registry.clear().await;
        assert!(registry.is_empty());
        for probe in &probes {
            assert_eq!(probe.destroyed.load(Ordering::SeqCst), 1);
        }
    }
}
