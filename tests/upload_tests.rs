//! Upload, retrieval and deletion through the coordinator.

mod common;

use bytes::Bytes;
use common::{content_column, descriptor, harness, object_files, upload};
use file_store::{BackendKind, models::file::UploadDescriptor, services::provider::compute_checksum};
use uuid::Uuid;

#[tokio::test]
async fn filesystem_upload_registers_path_and_url() {
    let h = harness(BackendKind::Filesystem).await;
    let receipt = upload(&h, b"hello world!", "Greeting.TXT").await;

    assert_eq!(receipt.backend, BackendKind::Filesystem);
    assert_eq!(receipt.checksum, compute_checksum(b"hello world!"));
    assert_eq!(receipt.url, Some(format!("/uploads/{}.txt", receipt.id)));

    let record = h.files.record(receipt.id).await.unwrap();
    assert_eq!(record.storage_kind, BackendKind::Filesystem);
    assert_eq!(record.filename, format!("{}.txt", receipt.id));
    assert_eq!(record.original_name, "Greeting.TXT");
    assert_eq!(record.extension, ".txt");
    assert_eq!(record.size_bytes, 12);
    assert_eq!(record.processing_status, "ready");
    assert!(record.path.is_some());
    assert_eq!(object_files(&h.storage_dir), vec![format!("{}.txt", receipt.id)]);
}

#[tokio::test]
async fn database_upload_keeps_bytes_in_row() {
    let h = harness(BackendKind::Database).await;
    let receipt = upload(&h, b"stored in sqlite", "db.txt").await;

    assert_eq!(receipt.backend, BackendKind::Database);
    assert!(receipt.url.is_none());
    let record = h.files.record(receipt.id).await.unwrap();
    assert_eq!(record.storage_kind, BackendKind::Database);
    assert!(record.path.is_none());
    assert_eq!(
        content_column(&h.db, receipt.id).await.as_deref(),
        Some(&b"stored in sqlite"[..])
    );
    assert!(object_files(&h.storage_dir).is_empty());
}

#[tokio::test]
async fn retrieve_returns_original_name_and_type() {
    for kind in BackendKind::ALL {
        let h = harness(kind).await;
        let receipt = h
            .files
            .upload(
                Bytes::from_static(b"{\"a\":1}"),
                descriptor("data.json", "application/json"),
            )
            .await
            .unwrap();

        let object = h.files.retrieve(receipt.id).await.unwrap();
        assert_eq!(&object.content[..], b"{\"a\":1}");
        assert_eq!(object.filename, "data.json");
        assert_eq!(object.content_type, "application/json");
        assert_eq!(object.backend, kind);
        assert!(h.files.exists(receipt.id).await.unwrap());
    }
}

#[tokio::test]
async fn upload_metadata_is_recorded() {
    let h = harness(BackendKind::Filesystem).await;
    let owner = Uuid::new_v4();
    let receipt = h
        .files
        .upload(
            Bytes::from_static(b"png-ish"),
            UploadDescriptor {
                original_name: "avatar.png".into(),
                content_type: "image/png".into(),
                declared_size: Some(7),
                owner_id: Some(owner),
                tags: vec!["avatar".into(), "profile".into()],
                is_public: true,
                encoding: Some("identity".into()),
            },
        )
        .await
        .unwrap();

    let record = h.files.record(receipt.id).await.unwrap();
    assert_eq!(record.owner_id, Some(owner));
    assert_eq!(record.tags, vec!["avatar", "profile"]);
    assert!(record.is_public);
    assert_eq!(record.encoding.as_deref(), Some("identity"));
}

#[tokio::test]
async fn invalid_uploads_leave_nothing_behind() {
    let h = harness(BackendKind::Filesystem).await;

    let err = h
        .files
        .upload(Bytes::new(), descriptor("empty.txt", "text/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "validation");

    let err = h
        .files
        .upload(
            Bytes::from_static(b"abc"),
            UploadDescriptor {
                declared_size: Some(4),
                ..descriptor("short.txt", "text/plain")
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "validation");

    let err = h
        .files
        .upload(Bytes::from_static(b"abc"), descriptor("  ", "text/plain"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "validation");

    assert!(object_files(&h.storage_dir).is_empty());
    assert_eq!(h.files.stats().await.unwrap().records.filesystem, 0);
}

#[tokio::test]
async fn failed_registration_removes_stored_bytes() {
    let h = harness(BackendKind::Filesystem).await;
    sqlx::query(
        "CREATE TRIGGER fail_insert BEFORE INSERT ON files
         BEGIN SELECT RAISE(ABORT, 'injected insert failure'); END",
    )
    .execute(&*h.db)
    .await
    .unwrap();

    let result = h
        .files
        .upload(Bytes::from_static(b"doomed"), descriptor("doomed.txt", "text/plain"))
        .await;

    assert!(result.is_err());
    assert!(object_files(&h.storage_dir).is_empty());
}

#[tokio::test]
async fn filesystem_tampering_is_detected_on_read() {
    let h = harness(BackendKind::Filesystem).await;
    let receipt = upload(&h, b"trust me", "t.txt").await;
    std::fs::write(h.storage_dir.join(format!("{}.txt", receipt.id)), b"trust m3").unwrap();

    let err = h.files.retrieve(receipt.id).await.unwrap_err();
    assert!(err.is_corruption(), "{:?}", err);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let h = harness(BackendKind::Filesystem).await;
    let id = Uuid::new_v4();

    assert!(h.files.retrieve(id).await.unwrap_err().is_not_found());
    assert!(h.files.soft_delete(id).await.unwrap_err().is_not_found());
    assert!(h.files.hard_delete(id).await.unwrap_err().is_not_found());
    assert!(!h.files.exists(id).await.unwrap());
}

#[tokio::test]
async fn soft_delete_hides_record_but_keeps_bytes() {
    let h = harness(BackendKind::Filesystem).await;
    let receipt = upload(&h, b"keep my bytes", "k.txt").await;

    h.files.soft_delete(receipt.id).await.unwrap();

    assert!(h.files.record(receipt.id).await.unwrap_err().is_not_found());
    assert!(!h.files.exists(receipt.id).await.unwrap());
    assert_eq!(object_files(&h.storage_dir).len(), 1);
    // Already deleted.
    assert!(h.files.soft_delete(receipt.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn hard_delete_removes_bytes_once() {
    for kind in BackendKind::ALL {
        let h = harness(kind).await;
        let receipt = upload(&h, b"bye", "b.txt").await;

        let deleted = h.files.hard_delete(receipt.id).await.unwrap();
        assert_eq!(deleted.backend, kind);
        assert_eq!(deleted.freed_bytes, 3);
        assert!(object_files(&h.storage_dir).is_empty());
        assert!(content_column(&h.db, receipt.id).await.is_none());

        let err = h.files.hard_delete(receipt.id).await.unwrap_err();
        assert!(err.is_not_found(), "{}: {:?}", kind, err);
    }
}

#[tokio::test]
async fn hard_delete_after_soft_delete_reclaims_bytes() {
    let h = harness(BackendKind::Filesystem).await;
    let receipt = upload(&h, b"two step", "s.txt").await;

    h.files.soft_delete(receipt.id).await.unwrap();
    let deleted = h.files.hard_delete(receipt.id).await.unwrap();

    assert_eq!(deleted.freed_bytes, 8);
    assert!(object_files(&h.storage_dir).is_empty());
}

#[tokio::test]
async fn switching_default_only_affects_new_uploads() {
    let h = harness(BackendKind::Filesystem).await;
    let before = upload(&h, b"first", "1.txt").await;

    let previous = h
        .files
        .orchestrator()
        .switch_provider(BackendKind::Database)
        .await
        .unwrap();
    assert_eq!(previous, BackendKind::Filesystem);

    let after = upload(&h, b"second", "2.txt").await;
    assert_eq!(after.backend, BackendKind::Database);

    // Existing files are still read from where their record says.
    let old = h.files.retrieve(before.id).await.unwrap();
    assert_eq!(old.backend, BackendKind::Filesystem);
    assert_eq!(&old.content[..], b"first");

    let stats = h.files.stats().await.unwrap();
    assert_eq!(stats.default_backend, BackendKind::Database);
    assert_eq!(stats.records.filesystem, 1);
    assert_eq!(stats.records.database, 1);
}
