//! Administrative workflows: orphan cleanup, backup and stats.
//!
//! None of these run on a schedule; they are invoked explicitly.

use crate::{
    models::{
        backend::BackendKind,
        report::{BackupReport, CleanupReport, ItemFailure, OrphanCandidate, StorageStats},
    },
    services::{error::StorageResult, upload_service::UploadCoordinator},
};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

impl UploadCoordinator {
    /// Reclaim bytes in `kind` that no live record stored in `kind` owns,
    /// plus crash leftovers older than the leftover grace period.
    ///
    /// Each object candidate is re-checked under its exclusive lock before
    /// anything is removed: an upload or migration may have claimed the id
    /// since the scan. Per-item failures are collected, not fatal.
    pub async fn cleanup_orphans(&self, kind: BackendKind) -> StorageResult<CleanupReport> {
        let provider = self.orchestrator.provider(kind)?;
        let live_ids = self.records.live_ids(Some(kind)).await?;
        let leftovers_before = Utc::now() - self.leftover_grace;
        info!(backend = %kind, live = live_ids.len(), "starting orphan cleanup");

        let scan = provider.orphan_candidates(&live_ids, leftovers_before).await?;
        let mut report = CleanupReport::new(kind);
        report.scanned = scan.scanned;

        for candidate in scan.candidates {
            let _guard = match candidate {
                OrphanCandidate::Object(id) => {
                    let guard = self.locks.write(id).await;
                    let claimed = match self.records.get(id).await {
                        Ok(record) => record.is_some_and(|r| r.storage_kind == kind),
                        Err(err) => {
                            report.failures.push(ItemFailure::new(id.to_string(), err));
                            continue;
                        }
                    };
                    if claimed {
                        debug!(%id, backend = %kind, "orphan candidate was claimed, keeping it");
                        continue;
                    }
                    Some(guard)
                }
                OrphanCandidate::Leftover(_) => None,
            };

            match provider.reclaim(&candidate).await {
                Ok(Some(bytes)) => {
                    report.reclaimed += 1;
                    report.bytes_freed += bytes;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(backend = %kind, item = %candidate, error = %err, "failed to reclaim orphan");
                    report.failures.push(ItemFailure::new(candidate.to_string(), err));
                }
            }
        }

        info!(
            backend = %kind,
            scanned = report.scanned,
            reclaimed = report.reclaimed,
            bytes_freed = report.bytes_freed,
            failures = report.failures.len(),
            "orphan cleanup finished"
        );
        Ok(report)
    }

    /// Copy everything stored in `kind` into `destination`.
    ///
    /// Backends that cannot back themselves up report `Unsupported`.
    pub async fn backup(
        &self,
        kind: BackendKind,
        destination: impl AsRef<Path>,
    ) -> StorageResult<BackupReport> {
        let provider = self.orchestrator.provider(kind)?;
        provider.backup(destination.as_ref()).await
    }

    /// Per-backend totals plus record counts.
    pub async fn stats(&self) -> StorageResult<StorageStats> {
        let mut backends = Vec::new();
        for kind in self.orchestrator.backends() {
            backends.push(self.orchestrator.stats_for(kind).await?);
        }

        Ok(StorageStats {
            default_backend: self.orchestrator.default_backend().await,
            backends,
            records: self.records.count_by_kind().await?,
        })
    }
}
