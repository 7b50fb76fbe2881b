//! Shared fixtures for the integration tests: a temp dir holding both the
//! SQLite database and the filesystem root, plus a provider wrapper that
//! fails or pauses on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use file_store::{
    BackendKind, FileRecords, StorageError, StorageOrchestrator, StorageProvider, StorageResult,
    UploadCoordinator, db,
    models::{
        file::UploadDescriptor,
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
        report::{BackendStats, BackupReport, OrphanCandidate, OrphanScan},
    },
    services::{
        database_provider::DatabaseProvider, filesystem_provider::FilesystemProvider,
        upload_service::UploadReceipt,
    },
};
use sqlx::SqlitePool;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

pub struct Harness {
    pub tmp: TempDir,
    pub db: Arc<SqlitePool>,
    pub storage_dir: PathBuf,
    pub files: UploadCoordinator,
}

/// Migrated SQLite file database inside `tmp`.
///
/// `sqlite::memory:` would give every pooled connection its own database.
pub async fn test_pool(tmp: &TempDir) -> Arc<SqlitePool> {
    let url = format!("sqlite://{}", tmp.path().join("meta.db").display());
    let pool = db::connect(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn harness(default: BackendKind) -> Harness {
    let tmp = TempDir::new().unwrap();
    let db = test_pool(&tmp).await;
    let storage_dir = tmp.path().join("files");
    let orchestrator = StorageOrchestrator::new(default, &storage_dir, db.clone());
    let files = UploadCoordinator::new(orchestrator, FileRecords::new(db.clone()), "/uploads");
    Harness {
        tmp,
        db,
        storage_dir,
        files,
    }
}

/// Like [`harness`], with both real providers wrapped in [`FaultyProvider`].
pub async fn faulty_harness(
    default: BackendKind,
) -> (Harness, Arc<FaultyProvider>, Arc<FaultyProvider>) {
    let tmp = TempDir::new().unwrap();
    let db = test_pool(&tmp).await;
    let storage_dir = tmp.path().join("files");

    let fs = Arc::new(FaultyProvider::new(Arc::new(FilesystemProvider::new(
        &storage_dir,
    ))));
    let database = Arc::new(FaultyProvider::new(Arc::new(DatabaseProvider::new(
        db.clone(),
    ))));
    let orchestrator = StorageOrchestrator::from_providers(
        default,
        [
            fs.clone() as Arc<dyn StorageProvider>,
            database.clone() as Arc<dyn StorageProvider>,
        ],
    );
    let files = UploadCoordinator::new(orchestrator, FileRecords::new(db.clone()), "/uploads");

    (
        Harness {
            tmp,
            db,
            storage_dir,
            files,
        },
        fs,
        database,
    )
}

pub fn descriptor(name: &str, content_type: &str) -> UploadDescriptor {
    UploadDescriptor {
        original_name: name.to_string(),
        content_type: content_type.to_string(),
        ..UploadDescriptor::default()
    }
}

pub async fn upload(h: &Harness, data: &'static [u8], name: &str) -> UploadReceipt {
    h.files
        .upload(Bytes::from_static(data), descriptor(name, "text/plain"))
        .await
        .unwrap()
}

/// Makes the next record update that changes `storage_kind` fail.
pub async fn break_record_updates(db: &SqlitePool) {
    sqlx::query(
        "CREATE TRIGGER fail_location_update BEFORE UPDATE OF storage_kind ON files
         BEGIN SELECT RAISE(ABORT, 'injected record failure'); END",
    )
    .execute(db)
    .await
    .unwrap();
}

pub async fn content_column(db: &SqlitePool, id: Uuid) -> Option<Vec<u8>> {
    sqlx::query_scalar::<_, Option<Vec<u8>>>("SELECT content FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
        .unwrap()
        .flatten()
}

pub fn object_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Parks one provider call after it has done its work, until released.
#[derive(Debug, Default)]
pub struct Pause {
    reached: Notify,
    release: Notify,
}

impl Pause {
    /// Resolves once the paused call is parked.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn hold(&self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

type PauseSlot = Mutex<Option<Arc<Pause>>>;

/// Delegates to a real provider unless a fault is armed.
#[derive(Debug)]
pub struct FaultyProvider {
    inner: Arc<dyn StorageProvider>,
    pub fail_store: AtomicBool,
    pub fail_retrieve: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Store succeeds but writes one flipped byte.
    pub corrupt_store: AtomicBool,
    after_store: PauseSlot,
    after_delete: PauseSlot,
}

impl FaultyProvider {
    pub fn new(inner: Arc<dyn StorageProvider>) -> Self {
        Self {
            inner,
            fail_store: AtomicBool::new(false),
            fail_retrieve: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            corrupt_store: AtomicBool::new(false),
            after_store: Mutex::default(),
            after_delete: Mutex::default(),
        }
    }

    /// The next successful store parks before returning.
    pub fn pause_after_store(&self) -> Arc<Pause> {
        Self::set_pause(&self.after_store)
    }

    /// The next successful delete parks before returning.
    pub fn pause_after_delete(&self) -> Arc<Pause> {
        Self::set_pause(&self.after_delete)
    }

    fn set_pause(slot: &PauseSlot) -> Arc<Pause> {
        let pause = Arc::new(Pause::default());
        *slot.lock().unwrap() = Some(pause.clone());
        pause
    }

    async fn maybe_pause(slot: &PauseSlot) {
        let pause = slot.lock().unwrap().take();
        if let Some(pause) = pause {
            pause.hold().await;
        }
    }

    pub fn arm(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        for flag in [
            &self.fail_store,
            &self.fail_retrieve,
            &self.fail_delete,
            &self.corrupt_store,
        ] {
            flag.store(false, Ordering::SeqCst);
        }
    }

    fn injected(&self, op: &str) -> StorageError {
        StorageError::write_failure(format!("injected {} failure in {}", op, self.kind()))
    }
}

#[async_trait]
impl StorageProvider for FaultyProvider {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    async fn store(
        &self,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(self.injected("store"));
        }
        if self.corrupt_store.load(Ordering::SeqCst) {
            let mut bytes = object.payload.to_vec();
            bytes[0] ^= 0xff;
            let tampered = StoredObjectDescriptor::new(
                bytes,
                object.original_name.clone(),
                object.content_type.clone(),
            );
            return self.inner.store(key, &tampered).await;
        }
        let stored = self.inner.store(key, object).await?;
        Self::maybe_pause(&self.after_store).await;
        Ok(stored)
    }

    async fn retrieve(&self, key: &ObjectKey) -> StorageResult<RetrievedObject> {
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(self.injected("retrieve"));
        }
        self.inner.retrieve(key).await
    }

    async fn delete(&self, key: &ObjectKey) -> StorageResult<DeletedObject> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(self.injected("delete"));
        }
        let deleted = self.inner.delete(key).await?;
        Self::maybe_pause(&self.after_delete).await;
        Ok(deleted)
    }

    async fn exists(&self, key: &ObjectKey) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn metadata(&self, key: &ObjectKey) -> StorageResult<Option<ObjectMetadata>> {
        self.inner.metadata(key).await
    }

    async fn stats(&self) -> StorageResult<BackendStats> {
        self.inner.stats().await
    }

    async fn orphan_candidates(
        &self,
        live_ids: &HashSet<Uuid>,
        leftovers_before: DateTime<Utc>,
    ) -> StorageResult<OrphanScan> {
        self.inner.orphan_candidates(live_ids, leftovers_before).await
    }

    async fn reclaim(&self, candidate: &OrphanCandidate) -> StorageResult<Option<u64>> {
        self.inner.reclaim(candidate).await
    }

    async fn backup(&self, destination: &Path) -> StorageResult<BackupReport> {
        self.inner.backup(destination).await
    }
}
