// Target resolution from configuration

use std::collections::HashMap;
use s32s3::config::BackupConfig;
use s32s3::target::{resolve_target, TargetRole};
use s32s3::BackupError;

fn config(source_provider: &str, dest_provider: &str) -> BackupConfig {
    let vars: HashMap<String, String> = [
        ("SOURCE_PROVIDER", source_provider),
        ("SOURCE_REGION", "us-east-1"),
        ("SOURCE_ENDPOINT", "http://localhost:9000"),
        ("SOURCE_ACCESS_KEY_ID", "test"),
        ("SOURCE_SECRET_ACCESS_KEY", "test"),
        ("DEST_PROVIDER", dest_provider),
        ("DEST_REGION", "us-east-1"),
        ("DEST_ENDPOINT", "http://localhost:9001"),
        ("DEST_ACCESS_KEY_ID", "test"),
        ("DEST_SECRET_ACCESS_KEY", "test"),
        ("CRYPT_PASSWORD", "test45367824"),
        ("CRYPT_PASSWORD2", "test2435143632"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    BackupConfig::from_env_map(&vars).expect("Failed to load configuration")
}

#[tokio::test]
async fn test_mock_targets_resolve() {
    let config = config("mock", "mock");

    let source = resolve_target(&config.source, TargetRole::Source)
        .await
        .expect("Failed to resolve source");
    let dest = resolve_target(&config.dest, TargetRole::Dest)
        .await
        .expect("Failed to resolve dest");

    assert!(source.list_buckets().await.expect("listing failed").is_empty());
    assert!(dest.export_metadata().await.expect("export failed").is_empty());
}

#[tokio::test]
async fn test_unknown_kind_names_role() {
    let config = config("mock", "Wasabi");

    let err = resolve_target(&config.dest, TargetRole::Dest).await.err().expect("should fail");

    match err {
        BackupError::UnsupportedTarget { kind, role } => {
            assert_eq!(kind, "Wasabi");
            assert_eq!(role, TargetRole::Dest);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        BackupError::UnsupportedTarget { kind: "Wasabi".into(), role: TargetRole::Dest }.to_string(),
        "unsupported target kind \"Wasabi\" for dest"
    );
}

#[cfg(feature = "minio")]
#[tokio::test]
async fn test_minio_target_builds_without_network() {
    let config = config("Minio", "mock");
    resolve_target(&config.source, TargetRole::Source)
        .await
        .expect("Failed to build MinIO target");
}
