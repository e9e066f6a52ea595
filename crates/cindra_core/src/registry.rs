//! Type identity registry.
//!
//! Hands out a small dense integer per distinct type, the first time the type
//! is seen. Ids never change afterwards and the id space is bounded by the
//! registry capacity.

use crate::config;
use crate::dispatch::CopyFns;
use crate::error::AnyError;
use ahash::RandomState;
use hashbrown::HashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

/// Dense per-type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(pub u16);

impl RegistryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entries {
    ids: FastHashMap<TypeId, RegistryId>,
    names: Vec<&'static str>,
    copiers: Vec<Option<CopyFns>>,
}

pub struct TypeRegistry {
    counter: AtomicU16,
    capacity: usize,
    entries: RwLock<Entries>,
}

impl TypeRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u16::MAX as usize);
        Self {
            counter: AtomicU16::new(0),
            capacity,
            entries: RwLock::new(Entries {
                ids: HashMap::with_capacity_and_hasher(capacity, fast_hasher()),
                names: Vec::with_capacity(capacity),
                copiers: Vec::with_capacity(capacity),
            }),
        }
    }

    /// The process-wide registry, sized from [`config::current`].
    pub fn global() -> &'static TypeRegistry {
        static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| TypeRegistry::with_capacity(config::current().type_capacity))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.counter.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id of `T`, assigning one on first use.
    ///
    /// Exhausting the capacity is fatal: the error is logged and the process
    /// aborts, since later ids would alias existing operator tables.
    pub fn id_of<T: ?Sized + 'static>(&self) -> RegistryId {
        match self.try_id_of::<T>() {
            Ok(id) => id,
            Err(err) => {
                log::error!("[registry] {err} while registering `{}`", std::any::type_name::<T>());
                std::process::abort();
            }
        }
    }

    /// Like [`TypeRegistry::id_of`] but reports exhaustion as an error.
    pub fn try_id_of<T: ?Sized + 'static>(&self) -> Result<RegistryId, AnyError> {
        let key = TypeId::of::<T>();
        if let Some(&id) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .get(&key)
        {
            return Ok(id);
        }

        let name = std::any::type_name::<T>();
        let id = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            // Another thread may have won the race between the two locks.
            if let Some(&id) = entries.ids.get(&key) {
                return Ok(id);
            }
            let next = self.counter.fetch_add(1, Ordering::AcqRel);
            if next as usize >= self.capacity {
                self.counter.fetch_sub(1, Ordering::AcqRel);
                return Err(AnyError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
            let id = RegistryId(next);
            entries.ids.insert(key, id);
            entries.names.push(name);
            id
        };
        // Loggers may box values, so the lock is released before logging.
        log::debug!("[registry] assigned id {id} to `{name}`");
        Ok(id)
    }

    /// Id of `T` if it has already been registered.
    pub fn lookup<T: ?Sized + 'static>(&self) -> Option<RegistryId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .get(&TypeId::of::<T>())
            .copied()
    }

    /// Diagnostic name of the type behind `id`.
    pub fn name_of(&self, id: RegistryId) -> Option<&'static str> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(id.index())
            .copied()
    }
}

impl TypeRegistry {
    /// Record the clone of the type behind `id`. The first record wins.
    pub(crate) fn record_copy(&self, id: RegistryId, fns: CopyFns) {
        if self.copy_fns(id).is_some() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.copiers.len() <= id.index() {
            entries.copiers.resize(id.index() + 1, None);
        }
        let slot = &mut entries.copiers[id.index()];
        if slot.is_none() {
            *slot = Some(fns);
        }
    }

    pub(crate) fn copy_fns(&self, id: RegistryId) -> Option<CopyFns> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .copiers
            .get(id.index())
            .copied()
            .flatten()
    }
}

/// Id of `T` in the process-wide registry.
pub fn id_of<T: ?Sized + 'static>() -> RegistryId {
    TypeRegistry::global().id_of::<T>()
}
