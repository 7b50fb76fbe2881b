//! Per-object shared/exclusive locks for multi-step workflows.
//!
//! Reads take an object's lock shared; anything that moves or removes bytes
//! takes it exclusive, so a reader never observes the window between two
//! steps of a migration or delete.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

type LockTable = Arc<Mutex<HashMap<Uuid, Arc<RwLock<()>>>>>;

/// Hands out one async read/write lock per object id. Entries are dropped
/// once nobody holds or waits on them.
#[derive(Clone, Debug, Default)]
pub struct ObjectLocks {
    table: LockTable,
}

enum Held {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Held for the duration of a workflow on one object.
pub struct ObjectGuard {
    id: Uuid,
    table: LockTable,
    _held: Held,
}

impl ObjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: Uuid) -> Arc<RwLock<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(id).or_default())
    }

    /// Shared access: any number of readers, no writer.
    pub async fn read(&self, id: Uuid) -> ObjectGuard {
        let held = Held::Shared(self.entry(id).read_owned().await);
        self.guard(id, held)
    }

    /// Exclusive access for workflows that change where the bytes are.
    pub async fn write(&self, id: Uuid) -> ObjectGuard {
        let held = Held::Exclusive(self.entry(id).write_owned().await);
        self.guard(id, held)
    }

    fn guard(&self, id: Uuid, held: Held) -> ObjectGuard {
        ObjectGuard {
            id,
            table: Arc::clone(&self.table),
            _held: held,
        }
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ObjectGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one inside our guard: nobody else holds
        // or waits on it.
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            table.remove(&self.id);
        }
    }
}
