use cloudfs_adapter::error::{FileSystemErrorCode, RevisionError};
use cloudfs_adapter::revision::{FileRevisionProvider, LogReadFailures, TreeFileRevisionProvider};
use cloudfs_adapter::tree::NodeModel;
use proptest::prelude::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::common::{settled_time, Harness, StaticFileSystemClient};

fn provider(h: &Harness, client: Arc<StaticFileSystemClient>) -> TreeFileRevisionProvider {
    TreeFileRevisionProvider::new(
        h.tree.clone(),
        h.roots.clone(),
        client,
        Arc::new(LogReadFailures),
        1000,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_version_change_diverges(start in 1u64..1000, delta in 1u64..1000) {
        let h = Harness::new();
        let file = h.add_file(h.top, "a.txt", 4, start);
        let client = Arc::new(StaticFileSystemClient::default());
        client.files.lock().insert(h.alt_id(file), b"data".to_vec());
        let provider = provider(&h, client.clone());

        // The file is written again between scheduling and executing the read
        let bumped = NodeModel::new(4, settled_time()).with_content_version(start + delta);
        h.tree.lock().update(file, bumped).unwrap();

        let result = runtime().block_on(provider.open_file_for_reading(
            file,
            start,
            CancellationToken::new(),
        ));
        match result {
            Err(RevisionError::ContentVersionDiverged { expected, actual, .. }) => {
                prop_assert_eq!(expected, start);
                prop_assert_eq!(actual, start + delta);
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            Ok(_) => prop_assert!(false, "read of a diverged version succeeded"),
        }
        prop_assert_eq!(client.opens.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn matching_version_streams_content() {
    let h = Harness::new();
    let dir = h.add_dir(h.top, "docs");
    let file = h.add_file(dir, "a.txt", 5, 7);
    let client = Arc::new(StaticFileSystemClient::default());
    client.files.lock().insert(h.alt_id(file), b"hello".to_vec());
    let provider = provider(&h, client.clone());

    let mut revision = provider
        .open_file_for_reading(file, 7, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(revision.content_version(), 7);
    assert_eq!(revision.size(), 5);
    assert_eq!(revision.snapshot().path, std::path::PathBuf::from("root/docs/a.txt"));

    let mut content = String::new();
    revision.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "hello");
    assert_eq!(h.model(file).content_version, 7);
}

#[tokio::test]
async fn unsettled_write_is_rejected_before_opening() {
    let h = Harness::new();
    let file = h.add_file(h.top, "a.txt", 5, 1);
    let fresh = NodeModel::new(5, chrono::Utc::now()).with_content_version(2);
    h.tree.lock().update(file, fresh).unwrap();
    let client = Arc::new(StaticFileSystemClient::default());
    let provider = provider(&h, client.clone());

    let err = provider
        .open_file_for_reading(file, 2, CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.error_code(), FileSystemErrorCode::LastWriteTimeTooRecent);
    assert_eq!(client.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_content_surfaces_client_code() {
    let h = Harness::new();
    let file = h.add_file(h.top, "a.txt", 5, 1);
    let provider = provider(&h, Arc::new(StaticFileSystemClient::default()));

    let err = provider
        .open_file_for_reading(file, 1, CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(!err.is_structural());
    assert_eq!(err.error_code(), FileSystemErrorCode::ObjectNotFound);
    assert_eq!(provider.reads().in_flight(), 0);
}
