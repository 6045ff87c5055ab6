//! Shared, read-only fixture pools

use loadgen_config::FixturesConfig;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rand::Rng;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::FixtureError;

/// Immutable sequence of values shared by every iteration.
///
/// Cloning a pool clones a pointer; the values themselves are never copied
/// or mutated after construction.
pub struct FixturePool<T> {
    name: Arc<str>,
    values: Arc<[T]>,
}

impl<T> Clone for FixturePool<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            values: self.values.clone(),
        }
    }
}

impl<T> fmt::Debug for FixturePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixturePool")
            .field("name", &self.name)
            .field("len", &self.values.len())
            .finish()
    }
}

impl<T> FixturePool<T> {
    pub fn new(name: &str, values: Vec<T>) -> Self {
        Self {
            name: Arc::from(name),
            values: Arc::from(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Uniformly random element
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        if self.values.is_empty() {
            return None;
        }
        self.values.get(rng.gen_range(0..self.values.len()))
    }
}

type Slot = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

/// Named fixture pools, each materialized exactly once per run no matter how
/// many iterations ask for it concurrently.
#[derive(Default)]
pub struct FixtureStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl fmt::Debug for FixtureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.slots.read().keys().cloned().collect();
        f.debug_struct("FixtureStore").field("pools", &names).finish()
    }
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize every configured pool up front
    pub fn from_config(config: &FixturesConfig) -> Result<Self, FixtureError> {
        let store = Self::new();
        for (name, source) in &config.pools {
            store.get_or_init(name, || source.load())?;
        }
        Ok(store)
    }

    /// Return the pool called `name`, running `init` if it does not exist
    /// yet. Concurrent callers for the same name wait for the first
    /// initialization instead of running their own.
    pub fn get_or_init<T, F, E>(&self, name: &str, init: F) -> Result<FixturePool<T>, FixtureError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Vec<T>, E>,
        E: fmt::Display,
    {
        let slot = self.slot(name);
        let value = slot.get_or_try_init(|| {
            let values = init().map_err(|e| FixtureError::Load {
                name: name.to_string(),
                message: e.to_string(),
            })?;
            if values.is_empty() {
                return Err(FixtureError::Empty(name.to_string()));
            }
            debug!(pool = name, size = values.len(), "Fixture pool materialized");
            Ok(Arc::new(FixturePool::new(name, values)) as Arc<dyn Any + Send + Sync>)
        })?;
        Self::downcast(name, value)
    }

    /// Pool that has already been materialized
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<FixturePool<T>, FixtureError> {
        let slot = self
            .slots
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FixtureError::NotFound(name.to_string()))?;
        let value = slot
            .get()
            .ok_or_else(|| FixtureError::NotFound(name.to_string()))?;
        Self::downcast(name, value)
    }

    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(name) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn downcast<T: Send + Sync + 'static>(
        name: &str,
        value: &Arc<dyn Any + Send + Sync>,
    ) -> Result<FixturePool<T>, FixtureError> {
        value
            .downcast_ref::<FixturePool<T>>()
            .cloned()
            .ok_or_else(|| FixtureError::TypeMismatch(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_config::FixtureSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn init_runs_once_under_concurrency() {
        let store = Arc::new(FixtureStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    store
                        .get_or_init("users", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok::<_, String>((1..=1000u64).collect())
                        })
                        .unwrap()
                })
            })
            .collect();

        let pools: Vec<FixturePool<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pools.iter().all(|pool| pool.len() == 1000));
        // every handle points at the same allocation
        assert!(pools
            .windows(2)
            .all(|pair| std::ptr::eq(pair[0].as_slice(), pair[1].as_slice())));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let store = FixtureStore::new();
        store
            .get_or_init("concerts", || Ok::<_, String>(vec![101u64, 202]))
            .unwrap();

        let err = store.get::<String>("concerts").unwrap_err();
        assert_eq!(err, FixtureError::TypeMismatch("concerts".to_string()));
    }

    #[test]
    fn unknown_pool_is_not_found() {
        let store = FixtureStore::new();
        assert_eq!(
            store.get::<u64>("missing").unwrap_err(),
            FixtureError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn empty_and_failing_pools_are_rejected() {
        let store = FixtureStore::new();
        assert_eq!(
            store
                .get_or_init("empty", || Ok::<Vec<u64>, String>(Vec::new()))
                .unwrap_err(),
            FixtureError::Empty("empty".to_string())
        );
        assert!(matches!(
            store.get_or_init::<u64, _, _>("broken", || Err("disk on fire")),
            Err(FixtureError::Load { .. })
        ));
    }

    #[test]
    fn from_config_materializes_every_pool() {
        let mut pools = BTreeMap::new();
        pools.insert("users".to_string(), FixtureSource::Range { start: 1, end: 10 });
        pools.insert(
            "concerts".to_string(),
            FixtureSource::Values { values: vec![101, 202, 303] },
        );
        let store = FixtureStore::from_config(&FixturesConfig { pools }).unwrap();

        let users = store.get::<u64>("users").unwrap();
        assert_eq!(users.len(), 10);
        assert_eq!(users.get(0), Some(&1));

        let concerts = store.get::<u64>("concerts").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picked = concerts.random(&mut rng).unwrap();
            assert!([101, 202, 303].contains(picked));
        }
    }
}
