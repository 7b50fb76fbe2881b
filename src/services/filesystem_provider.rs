//! src/services/filesystem_provider.rs
//!
//! FilesystemProvider: objects as flat files named `<id><extension>` beneath
//! a single root directory. Writes go through a temporary file that is
//! fsynced and renamed into place, so a failed store never leaves a partial
//! object behind.

use crate::{
    models::{
        backend::BackendKind,
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
        report::{BackendStats, BackupReport, ItemFailure, OrphanCandidate, OrphanScan},
    },
    services::{
        error::{StorageError, StorageResult},
        provider::{StorageProvider, compute_checksum},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::HashSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of in-flight write files. They are never reported as objects and
/// only reclaimed once stale.
const TEMP_PREFIX: &str = ".tmp-";

#[derive(Clone, Debug)]
pub struct FilesystemProvider {
    /// Directory holding every object. Created on first write.
    root: PathBuf,
}

/// A regular file found under the root.
struct StoredFile {
    name: String,
    path: PathBuf,
    len: u64,
    modified: Option<DateTime<Utc>>,
}

impl FilesystemProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the object. Does not check for existence.
    pub fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Id encoded in a file name: everything before the first dot.
    fn id_stem(name: &str) -> Option<Uuid> {
        name.split('.').next().and_then(|stem| stem.parse().ok())
    }

    /// List regular files under the root, skipping hidden ones (temp files
    /// of in-flight stores, probes).
    ///
    /// A missing root is an empty backend, not an error.
    async fn stored_files(&self) -> StorageResult<Vec<StoredFile>> {
        self.scan(|name| !name.starts_with('.')).await
    }

    /// Temp files last written before `cutoff`.
    async fn stale_temp_files(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<StoredFile>> {
        let files = self.scan(|name| name.starts_with(TEMP_PREFIX)).await?;
        Ok(files
            .into_iter()
            .filter(|file| file.modified.is_some_and(|at| at < cutoff))
            .collect())
    }

    async fn scan(&self, wanted: impl Fn(&str) -> bool) -> StorageResult<Vec<StoredFile>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !wanted(&name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed between listing and stat.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Io(err)),
            };
            if !meta.is_file() {
                continue;
            }
            files.push(StoredFile {
                name,
                path: entry.path(),
                len: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Remove every file whose id stem is exactly `id`.
    /// Returns `(bytes freed, files removed)`.
    async fn remove_by_stem(&self, id: Uuid) -> StorageResult<(u64, usize)> {
        let mut freed_bytes = 0;
        let mut removed = 0;

        for file in self.stored_files().await? {
            if Self::id_stem(&file.name) != Some(id) {
                continue;
            }
            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    debug!("removed physical file {}", file.path.display());
                    freed_bytes += file.len;
                    removed += 1;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("file {} already missing", file.path.display());
                }
                Err(err) => return Err(Self::write_error(&file.path, err)),
            }
        }
        Ok((freed_bytes, removed))
    }

    /// Remove one file directly under the root by name.
    async fn remove_named(&self, name: &str) -> StorageResult<Option<u64>> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StorageError::validation(format!(
                "`{}` is not a file name under the storage root",
                name
            )));
        }
        let path = self.root.join(name);
        let len = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(Some(len)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::write_error(&path, err)),
        }
    }

    /// Refuse destinations that resolve to the root or anything beneath it,
    /// however they are spelled. Copying a file onto itself truncates it.
    async fn check_backup_destination(&self, destination: &Path) -> StorageResult<PathBuf> {
        let created = !fs::try_exists(destination).await?;
        fs::create_dir_all(destination)
            .await
            .map_err(|err| Self::write_error(destination, err))?;
        let resolved = fs::canonicalize(destination).await?;

        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            // Nothing stored yet, so nothing to overwrite.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(resolved),
            Err(err) => return Err(StorageError::Io(err)),
        };

        if resolved.starts_with(&root) {
            if created {
                let _ = fs::remove_dir_all(destination).await;
            }
            return Err(StorageError::validation(format!(
                "backup destination {} lies inside the storage root {}",
                destination.display(),
                root.display()
            )));
        }
        Ok(resolved)
    }

    /// Write `payload` to `tmp_path` and flush it to disk.
    async fn write_temp(tmp_path: &Path, payload: &[u8]) -> io::Result<()> {
        let mut file = File::create(tmp_path).await?;
        file.write_all(payload).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Move the finished temp file over the final object path.
    async fn commit(tmp_path: &Path, file_path: &Path) -> io::Result<()> {
        match fs::rename(tmp_path, file_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await
            }
            Err(err) => Err(err),
        }
    }

    fn write_error(path: &Path, err: io::Error) -> StorageError {
        StorageError::write_failure(format!("{}: {}", path.display(), err))
    }
}

#[async_trait]
impl StorageProvider for FilesystemProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    async fn store(
        &self,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject> {
        object.validate()?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| Self::write_error(&self.root, err))?;

        let file_path = self.object_path(key);
        let tmp_path = self.root.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));

        if let Err(err) = Self::write_temp(&tmp_path, &object.payload).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::write_error(&tmp_path, err));
        }
        if let Err(err) = Self::commit(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::write_error(&file_path, err));
        }

        // Re-stat what landed on disk before reporting success.
        let written = fs::metadata(&file_path)
            .await
            .map_err(|err| Self::write_error(&file_path, err))?;
        if written.len() != object.len() {
            let _ = fs::remove_file(&file_path).await;
            return Err(StorageError::write_failure(format!(
                "{}: wrote {} bytes, expected {}",
                file_path.display(),
                written.len(),
                object.len()
            )));
        }

        let checksum = compute_checksum(&object.payload);
        let locator = fs::canonicalize(&file_path)
            .await
            .unwrap_or_else(|_| file_path.clone());

        info!(
            id = %key.id,
            path = %locator.display(),
            size = object.len(),
            checksum = %checksum,
            "stored object on filesystem"
        );

        Ok(StoredObject {
            id: key.id,
            backend: BackendKind::Filesystem,
            size: object.len(),
            checksum,
            locator: Some(locator),
        })
    }

    async fn retrieve(&self, key: &ObjectKey) -> StorageResult<RetrievedObject> {
        let file_path = self.object_path(key);
        let content = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::not_found(BackendKind::Filesystem, key.id)
            } else {
                StorageError::Io(err)
            }
        })?;

        let checksum = compute_checksum(&content);
        let content_type = mime_guess::from_path(&file_path)
            .first_or_octet_stream()
            .to_string();

        debug!(
            id = %key.id,
            path = %file_path.display(),
            size = content.len(),
            "read object from filesystem"
        );

        Ok(RetrievedObject {
            id: key.id,
            backend: BackendKind::Filesystem,
            size: content.len() as u64,
            content: Bytes::from(content),
            checksum,
            filename: key.file_name(),
            content_type,
        })
    }

    /// Removes the object file and any leftover `<id>.*` artifacts sharing
    /// its exact id stem.
    async fn delete(&self, key: &ObjectKey) -> StorageResult<DeletedObject> {
        let (freed_bytes, removed) = self.remove_by_stem(key.id).await?;
        if removed == 0 {
            return Err(StorageError::not_found(BackendKind::Filesystem, key.id));
        }

        info!(id = %key.id, freed_bytes, removed, "deleted object from filesystem");
        Ok(DeletedObject {
            id: key.id,
            backend: BackendKind::Filesystem,
            freed_bytes,
            removed,
        })
    }

    async fn exists(&self, key: &ObjectKey) -> StorageResult<bool> {
        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn metadata(&self, key: &ObjectKey) -> StorageResult<Option<ObjectMetadata>> {
        let file_path = self.object_path(key);
        let meta = match fs::metadata(&file_path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Some(ObjectMetadata {
            size: meta.len(),
            content_type: mime_guess::from_path(&file_path)
                .first_or_octet_stream()
                .to_string(),
            filename: key.file_name(),
            last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }))
    }

    async fn stats(&self) -> StorageResult<BackendStats> {
        let files = self.stored_files().await?;
        Ok(BackendStats {
            backend: BackendKind::Filesystem,
            object_count: files.len() as u64,
            total_bytes: files.iter().map(|f| f.len).sum(),
        })
    }

    /// Object files whose id stem is not live, files with no id stem at all,
    /// and temp files older than the cutoff.
    async fn orphan_candidates(
        &self,
        live_ids: &HashSet<Uuid>,
        leftovers_before: DateTime<Utc>,
    ) -> StorageResult<OrphanScan> {
        let mut scan = OrphanScan::default();
        let mut seen = HashSet::new();

        for file in self.stored_files().await? {
            scan.scanned += 1;
            match Self::id_stem(&file.name) {
                Some(id) if live_ids.contains(&id) => {}
                Some(id) => {
                    if seen.insert(id) {
                        scan.candidates.push(OrphanCandidate::Object(id));
                    }
                }
                None => scan.candidates.push(OrphanCandidate::Leftover(file.name)),
            }
        }

        for file in self.stale_temp_files(leftovers_before).await? {
            scan.scanned += 1;
            scan.candidates.push(OrphanCandidate::Leftover(file.name));
        }

        debug!(
            scanned = scan.scanned,
            candidates = scan.candidates.len(),
            "scanned filesystem for orphans"
        );
        Ok(scan)
    }

    async fn reclaim(&self, candidate: &OrphanCandidate) -> StorageResult<Option<u64>> {
        let freed = match candidate {
            OrphanCandidate::Object(id) => match self.remove_by_stem(*id).await? {
                (_, 0) => None,
                (bytes, _) => Some(bytes),
            },
            OrphanCandidate::Leftover(name) => self.remove_named(name).await?,
        };
        if let Some(bytes) = freed {
            debug!(item = %candidate, bytes, "reclaimed orphan from filesystem");
        }
        Ok(freed)
    }

    async fn backup(&self, destination: &Path) -> StorageResult<BackupReport> {
        let resolved = self.check_backup_destination(destination).await?;

        let mut report = BackupReport {
            backend: BackendKind::Filesystem,
            destination: destination.to_path_buf(),
            copied: 0,
            bytes_copied: 0,
            failures: Vec::new(),
        };

        for file in self.stored_files().await? {
            match fs::copy(&file.path, resolved.join(&file.name)).await {
                Ok(bytes) => {
                    report.copied += 1;
                    report.bytes_copied += bytes;
                }
                Err(err) => {
                    warn!(path = %file.path.display(), error = %err, "failed to back up file");
                    report.failures.push(ItemFailure::new(file.name, err));
                }
            }
        }

        info!(
            destination = %destination.display(),
            copied = report.copied,
            bytes = report.bytes_copied,
            failures = report.failures.len(),
            "filesystem backup finished"
        );
        Ok(report)
    }
}
