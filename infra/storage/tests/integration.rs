use keeper_storage::{Storage, StorageError};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

async fn storage() -> (TempDir, Storage) {
    let tmp = TempDir::new().expect("temp dir");
    let storage = Storage::builder().root(tmp.path().join("files")).connect().await.expect("storage");
    (tmp, storage)
}

#[tokio::test]
async fn commit_makes_the_file_visible() {
    let (_tmp, storage) = storage().await;
    let owner = storage.owner(7);

    let (pending, mut file) = owner.create("photo.jpg").await.unwrap();
    file.write_all(b"jpeg bytes").await.unwrap();
    file.sync_all().await.unwrap();
    drop(file);

    let relative = pending.commit().await.unwrap();
    assert_eq!(relative, Path::new("7/photo.jpg"));
    assert_eq!(tokio::fs::read(storage.resolve(&relative).unwrap()).await.unwrap(), b"jpeg bytes");
}

#[tokio::test]
async fn dropped_upload_leaves_nothing_behind() {
    let (tmp, storage) = storage().await;
    let owner = storage.owner(7);

    let (pending, mut file) = owner.create("draft.bin").await.unwrap();
    file.write_all(b"partial").await.unwrap();
    drop(file);
    drop(pending);

    let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("files/7")).unwrap().flatten().collect();
    assert!(leftovers.is_empty(), "temporary file should be removed: {leftovers:?}");
}

#[tokio::test]
async fn failed_commit_removes_the_temporary() {
    let (tmp, storage) = storage().await;
    let owner = storage.owner(1);
    let (first, file) = owner.create("x.bin").await.unwrap();
    drop(file);
    let (second, mut file) = owner.create("x.bin").await.unwrap();
    file.write_all(b"late").await.unwrap();
    drop(file);

    first.commit().await.unwrap();
    assert!(matches!(second.commit().await, Err(StorageError::AlreadyExists { .. })));
    assert_eq!(std::fs::read_dir(tmp.path().join("files/1")).unwrap().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_commits_of_one_name_publish_exactly_once() {
    let (_tmp, storage) = storage().await;
    let owner = storage.owner(5);

    for round in 0..50 {
        let name = format!("race-{round}.bin");
        let mut racers = Vec::new();
        for payload in [b"first".as_slice(), b"second".as_slice()] {
            let (pending, mut file) = owner.create(&name).await.unwrap();
            file.write_all(payload).await.unwrap();
            file.sync_all().await.unwrap();
            drop(file);
            racers.push(tokio::spawn(async move { (pending.commit().await, payload) }));
        }

        let mut published = Vec::new();
        for racer in racers {
            match racer.await.unwrap() {
                (Ok(relative), payload) => published.push((relative, payload)),
                (Err(err), _) => assert!(matches!(err, StorageError::AlreadyExists { .. })),
            }
        }
        assert_eq!(published.len(), 1, "round {round}");
        let (relative, payload) = &published[0];
        assert_eq!(tokio::fs::read(storage.resolve(relative).unwrap()).await.unwrap(), *payload);
    }
}

#[tokio::test]
async fn existing_names_are_not_overwritten() {
    let (_tmp, storage) = storage().await;
    let owner = storage.owner(3);
    let (pending, file) = owner.create("a.txt").await.unwrap();
    drop(file);
    pending.commit().await.unwrap();

    let err = owner.create("a.txt").await.unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists { .. }));
}

#[tokio::test]
async fn owners_cannot_reach_each_other() {
    let (_tmp, storage) = storage().await;
    let (pending, file) = storage.owner(1).create("secret.txt").await.unwrap();
    drop(file);
    let relative = pending.commit().await.unwrap();

    let err = storage.owner(2).open(&relative).await.unwrap_err();
    assert!(matches!(err, StorageError::PathTraversalAttempt { .. }));
    let err = storage.owner(2).remove(&relative).await.unwrap_err();
    assert!(matches!(err, StorageError::PathTraversalAttempt { .. }));
    assert!(storage.owner(1).open(&relative).await.is_ok());
}

#[tokio::test]
async fn traversal_is_rejected() {
    let (_tmp, storage) = storage().await;
    assert!(matches!(storage.resolve("../outside"), Err(StorageError::PathTraversalAttempt { .. })));
    assert!(matches!(storage.resolve("/etc/passwd"), Err(StorageError::PathTraversalAttempt { .. })));
    assert!(matches!(storage.owner(1).create("../x").await, Err(StorageError::InvalidName { .. })));
}

#[tokio::test]
async fn missing_files_map_to_not_found() {
    let (_tmp, storage) = storage().await;
    let owner = storage.owner(9);
    assert!(matches!(owner.open("9/none").await, Err(StorageError::FileNotFound { .. })));
    assert!(matches!(owner.remove("9/none").await, Err(StorageError::FileNotFound { .. })));
}

#[tokio::test]
async fn purge_only_touches_stale_temporaries() {
    let (tmp, storage) = storage().await;
    let dir = tmp.path().join("files/5");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("kept.bin"), b"keep").unwrap();
    std::fs::write(dir.join("crashed.bin.keepertmp.9"), b"junk").unwrap();

    let fresh = storage.purge_tmp(Duration::from_secs(3600)).await;
    assert_eq!(fresh.removed, 0);

    let report = storage.purge_tmp(Duration::ZERO).await;
    assert_eq!(report.removed, 1);
    assert!(dir.join("kept.bin").exists());
    assert!(!dir.join("crashed.bin.keepertmp.9").exists());
}
