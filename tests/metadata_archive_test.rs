// Integration tests for metadata export, import and the archive container

mod common;

use common::{archive_in_order, ScriptedAdmin};
use pretty_assertions::assert_eq;
use s32s3::admin::{BucketImportReport, BucketOutcome};
use s32s3::archive::{EntryKind, MetadataArchive, ARCHIVE_FILE_NAME};
use s32s3::archiver::MetadataArchiver;
use s32s3::target::{MockTarget, Target};
use s32s3::BackupError;

#[tokio::test]
async fn test_export_writes_entries_in_fixed_order() {
    let admin = ScriptedAdmin::new()
        .exporting(EntryKind::Iam, b"iam-bytes")
        .exporting(EntryKind::Buckets, b"bucket-bytes")
        .exporting(EntryKind::Config, b"config-bytes");
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let path = MetadataArchiver::new(&admin)
        .export_to_dir(dir.path())
        .await
        .expect("Failed to export metadata");
    assert_eq!(path, dir.path().join(ARCHIVE_FILE_NAME));

    let archive = MetadataArchive::read_from_file(&path).expect("Failed to read archive");
    let names: Vec<&str> = archive.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["iam.zip", "buckets.zip", "config.txt"]);
    assert_eq!(archive.get(EntryKind::Buckets), Some(&b"bucket-bytes"[..]));
}

#[tokio::test]
async fn test_export_failure_names_the_stage() {
    let admin = ScriptedAdmin::new().failing_export(EntryKind::Buckets);

    let err = MetadataArchiver::new(&admin).export().await.unwrap_err();

    match err {
        BackupError::ExportFailed { stage, .. } => assert_eq!(stage, EntryKind::Buckets),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_import_is_commutative_over_entry_order() {
    let forward = archive_in_order(&[EntryKind::Iam, EntryKind::Buckets, EntryKind::Config]);
    let shuffled = archive_in_order(&[EntryKind::Config, EntryKind::Iam, EntryKind::Buckets]);

    let outcomes = |admin: ScriptedAdmin, archive: MetadataArchive| async move {
        let result = MetadataArchiver::new(&admin).import(&archive).await;
        let report = match result {
            Ok(report) => report,
            Err(BackupError::PartialImportFailure { report }) => report,
            Err(other) => panic!("unexpected error: {other}"),
        };
        let mut succeeded = report.succeeded();
        let mut failed = report.failed();
        succeeded.sort();
        failed.sort();
        (succeeded, failed)
    };

    let a = outcomes(ScriptedAdmin::new().failing_import(EntryKind::Iam), forward).await;
    let b = outcomes(ScriptedAdmin::new().failing_import(EntryKind::Iam), shuffled).await;

    assert_eq!(a, b);
    assert_eq!(a.0, vec![EntryKind::Buckets, EntryKind::Config]);
    assert_eq!(a.1, vec![EntryKind::Iam]);
}

#[tokio::test]
async fn test_import_follows_received_order_and_ignores_unknown_entries() {
    let admin = ScriptedAdmin::new();
    let mut archive = archive_in_order(&[EntryKind::Config, EntryKind::Buckets]);
    archive.push("notes.txt", b"future entry".to_vec());
    archive.push(EntryKind::Iam.file_name(), b"iam".to_vec());

    let report = MetadataArchiver::new(&admin)
        .import(&archive)
        .await
        .expect("Failed to import metadata");

    let order: Vec<EntryKind> = admin.imported().into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(order, vec![EntryKind::Config, EntryKind::Buckets, EntryKind::Iam]);
    assert_eq!(report.entries().len(), 3);
}

#[tokio::test]
async fn test_bucket_failures_are_reported_per_bucket() {
    let admin = ScriptedAdmin::new().with_bucket_report(
        BucketImportReport::new()
            .failed("x", "policy: access denied")
            .restored("y"),
    );
    let archive = archive_in_order(&[EntryKind::Iam, EntryKind::Buckets, EntryKind::Config]);

    let err = MetadataArchiver::new(&admin).import(&archive).await.unwrap_err();
    let BackupError::PartialImportFailure { report } = err else {
        panic!("expected a partial import failure");
    };

    assert_eq!(report.succeeded(), vec![EntryKind::Iam, EntryKind::Config]);
    assert_eq!(report.failed(), vec![EntryKind::Buckets]);

    let buckets = report
        .outcome(EntryKind::Buckets)
        .and_then(|o| o.buckets.as_ref())
        .expect("bucket detail should be kept");
    assert_eq!(
        buckets.outcome("x"),
        Some(&BucketOutcome::Failed("policy: access denied".to_string()))
    );
    assert_eq!(buckets.outcome("y"), Some(&BucketOutcome::Restored));

    let attempted: Vec<EntryKind> = admin.imported().into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(attempted, vec![EntryKind::Iam, EntryKind::Buckets, EntryKind::Config]);
}

#[tokio::test]
async fn test_failed_entry_does_not_block_siblings() {
    let admin = ScriptedAdmin::new().failing_import(EntryKind::Buckets);
    let archive = archive_in_order(&[EntryKind::Buckets, EntryKind::Iam, EntryKind::Config]);

    let err = MetadataArchiver::new(&admin).import(&archive).await.unwrap_err();

    assert!(matches!(err, BackupError::PartialImportFailure { .. }));
    assert_eq!(admin.imported().len(), 3);
}

#[tokio::test]
async fn test_mock_rejects_different_bytes_and_accepts_identical() {
    let held = MetadataArchive::from_parts(b"iam".to_vec(), b"buckets".to_vec(), b"config".to_vec());
    let target = MockTarget::new();
    target.import_metadata(&held).await.expect("Failed to import into empty mock");

    target
        .import_metadata(&held)
        .await
        .expect("Identical restore should succeed");

    let different = MetadataArchive::from_parts(b"iam".to_vec(), b"other".to_vec(), b"config".to_vec());
    let err = target.import_metadata(&different).await.unwrap_err();
    assert!(matches!(err, BackupError::MetadataMismatch { entry: EntryKind::Buckets }));
}

#[tokio::test]
async fn test_round_trip_into_fresh_target() {
    let source = MockTarget::new()
        .with_metadata(EntryKind::Iam, b"\x50\x4b\x03\x04 iam".to_vec())
        .with_metadata(EntryKind::Buckets, b"\x50\x4b\x03\x04 buckets".to_vec())
        .with_metadata(EntryKind::Config, b"encrypted-config".to_vec());
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let exported = source.export_metadata().await.expect("Failed to export");
    let path = exported
        .write_to_file(&dir.path().join(ARCHIVE_FILE_NAME))
        .expect("Failed to write archive");
    let archive = MetadataArchive::read_from_file(&path).expect("Failed to read archive");

    let fresh = MockTarget::new();
    fresh.import_metadata(&archive).await.expect("Failed to import");

    for kind in EntryKind::ALL {
        assert_eq!(fresh.metadata(kind), source.metadata(kind), "entry {kind}");
    }
}
