use keeper_database::Database;
use keeper_domain::file::{BinaryFile, CHUNK_SIZE, Confirm, ErrorMessage, TRANSFER_COMPLETED};
use keeper_domain::identity::Principal;
use keeper_kernel::{ErrorKind, KeeperError, RequestContext};
use keeper_storage::Storage;
use keeper_transfer::{ChannelTransport, FileService, Frame, Transport, TransferEngine, close_code};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::task::JoinHandle;

struct Harness {
    dir: TempDir,
    db: Database,
    engine: TransferEngine,
    files: FileService,
}

impl Harness {
    fn store(&self) -> PathBuf {
        self.dir.path().join("files")
    }
}

async fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("transfer.db").display());
    let db = Database::builder().url(url).init().await.expect("database");
    let storage = Storage::builder().root(dir.path().join("files")).connect().await.expect("storage");
    let engine = TransferEngine::new(db.clone(), storage.clone());
    let files = FileService::new(db.clone(), storage);
    Harness { dir, db, engine, files }
}

async fn user(db: &Database, login: &str) -> Principal {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (login, password_hash, created_at) VALUES (?, 'x', datetime('now')) RETURNING id",
    )
    .bind(login)
    .fetch_one(db.pool())
    .await
    .expect("insert user");
    Principal { id, login: login.to_owned() }
}

type Server = JoinHandle<Result<BinaryFile, KeeperError>>;

fn serve_upload(engine: &TransferEngine, principal: &Principal) -> (ChannelTransport, Server) {
    let (client, mut server) = ChannelTransport::pair(16);
    let engine = engine.clone();
    let mut ctx = RequestContext::authenticated(principal.clone());
    let task = tokio::spawn(async move { engine.upload(&mut ctx, &mut server).await });
    (client, task)
}

fn serve_download(engine: &TransferEngine, principal: &Principal) -> (ChannelTransport, Server) {
    let (client, mut server) = ChannelTransport::pair(16);
    let engine = engine.clone();
    let mut ctx = RequestContext::authenticated(principal.clone());
    let task = tokio::spawn(async move { engine.download(&mut ctx, &mut server).await });
    (client, task)
}

async fn next(client: &mut ChannelTransport) -> Frame {
    client.recv().await.expect("frame").expect("transport")
}

async fn expect_confirm(client: &mut ChannelTransport) {
    match next(client).await {
        Frame::Text(text) => {
            let confirm: Confirm = serde_json::from_str(&text).expect("confirm json");
            assert!(confirm.confirm);
        },
        other => panic!("expected confirm, got {other:?}"),
    }
}

async fn expect_close(client: &mut ChannelTransport) -> (u16, Option<ErrorMessage>) {
    match next(client).await {
        Frame::Close(Some(frame)) if frame.reason.is_empty() => (frame.code, None),
        Frame::Close(Some(frame)) => (frame.code, Some(serde_json::from_str(&frame.reason).expect("reason json"))),
        other => panic!("expected close, got {other:?}"),
    }
}

async fn send_text(client: &mut ChannelTransport, text: impl Into<String>) {
    client.send(Frame::Text(text.into())).await.expect("send text");
}

async fn upload(h: &Harness, principal: &Principal, name: &str, data: &[u8], step: usize) -> BinaryFile {
    let (mut client, server) = serve_upload(&h.engine, principal);
    send_text(&mut client, format!(r#"{{"file_name":"{name}","size":{}}}"#, data.len())).await;
    expect_confirm(&mut client).await;
    for chunk in data.chunks(step) {
        client.send(Frame::Binary(chunk.to_vec())).await.expect("send chunk");
    }
    send_text(&mut client, TRANSFER_COMPLETED).await;
    assert_eq!(expect_close(&mut client).await, (close_code::NORMAL, None));
    server.await.expect("join").expect("upload")
}

async fn download(h: &Harness, principal: &Principal, request: &str) -> Vec<u8> {
    let (mut client, server) = serve_download(&h.engine, principal);
    send_text(&mut client, request).await;
    expect_confirm(&mut client).await;

    let mut received = Vec::new();
    loop {
        match next(&mut client).await {
            Frame::Binary(chunk) => {
                assert!(chunk.len() <= CHUNK_SIZE);
                received.extend_from_slice(&chunk);
            },
            Frame::Close(Some(frame)) => {
                assert_eq!(frame.code, close_code::NORMAL);
                break;
            },
            other => panic!("unexpected frame {other:?}"),
        }
    }
    server.await.expect("join").expect("download");
    received
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from((i * 31 + i / 7) % 251).unwrap()).collect()
}

#[tokio::test]
async fn uploads_round_trip_regardless_of_chunking() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let data = sample(200_000);

    for (n, step) in [1usize, 7, 1024, 4096, 65_537].into_iter().enumerate() {
        let name = format!("photo-{n}.bin");
        // single-byte frames are slow; keep that case small
        let payload = if step == 1 { &data[..3_000] } else { &data[..] };

        let stored = upload(&h, &alice, &name, payload, step).await;
        assert_eq!(stored.file_name, name);
        assert_eq!(stored.size, payload.len() as u64);

        let by_id = download(&h, &alice, &format!(r#"{{"id":{}}}"#, stored.id)).await;
        assert_eq!(by_id, payload);
        let by_name = download(&h, &alice, &format!(r#"{{"file_name":"{name}"}}"#)).await;
        assert_eq!(by_name, payload);
    }

    let mut ctx = RequestContext::authenticated(alice);
    assert_eq!(h.files.list(&mut ctx).await.expect("list").len(), 5);
}

#[tokio::test]
async fn short_upload_leaves_nothing_behind() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let (mut client, server) = serve_upload(&h.engine, &alice);

    send_text(&mut client, r#"{"file_name":"short.bin","size":10}"#).await;
    expect_confirm(&mut client).await;
    client.send(Frame::Binary(vec![1, 2, 3, 4, 5])).await.expect("send");
    send_text(&mut client, TRANSFER_COMPLETED).await;

    let (code, reason) = expect_close(&mut client).await;
    assert_eq!(code, close_code::INTERNAL);
    let reason = reason.expect("reason");
    assert_eq!(reason.status_code, close_code::INTERNAL);
    assert_eq!(reason.message, "declared 10 bytes, received 5");
    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Validation);

    let mut ctx = RequestContext::authenticated(alice.clone());
    assert!(h.files.list(&mut ctx).await.expect("list").is_empty());
    let owner_dir = h.store().join(alice.id.to_string());
    let leftovers = std::fs::read_dir(&owner_dir).map(Iterator::count).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn oversized_upload_is_cut_off() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let (mut client, server) = serve_upload(&h.engine, &alice);

    send_text(&mut client, r#"{"file_name":"big.bin","size":4}"#).await;
    expect_confirm(&mut client).await;
    client.send(Frame::Binary(vec![0; 16])).await.expect("send");

    let (code, _) = expect_close(&mut client).await;
    assert_eq!(code, close_code::INTERNAL);
    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Validation);
    assert!(!h.store().join(alice.id.to_string()).join("big.bin").exists());
}

#[tokio::test]
async fn any_text_frame_ends_the_payload() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let (mut client, server) = serve_upload(&h.engine, &alice);

    send_text(&mut client, r#"{"file_name":"done.txt","size":4}"#).await;
    expect_confirm(&mut client).await;
    client.send(Frame::Binary(b"done".to_vec())).await.expect("send");
    send_text(&mut client, "bye").await;

    assert_eq!(expect_close(&mut client).await, (close_code::NORMAL, None));
    let stored = server.await.expect("join").expect("upload");
    assert_eq!(download(&h, &alice, &format!(r#"{{"id":{}}}"#, stored.id)).await, b"done");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_uploads_of_one_name_keep_a_consistent_record() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;

    for round in 0..20 {
        let name = format!("race-{round}.bin");
        let mut clients = Vec::new();
        for payload in [sample(3_000), sample(5_000)] {
            let (mut client, server) = serve_upload(&h.engine, &alice);
            send_text(&mut client, format!(r#"{{"file_name":"{name}","size":{}}}"#, payload.len())).await;
            clients.push((client, server, payload));
        }

        // Stream both once both handshakes are done, so both reach the commit.
        let racers: Vec<_> = clients
            .into_iter()
            .map(|(mut client, server, payload)| {
                tokio::spawn(async move {
                    let accepted = matches!(next(&mut client).await, Frame::Text(_));
                    if accepted {
                        for chunk in payload.chunks(1024) {
                            if client.send(Frame::Binary(chunk.to_vec())).await.is_err() {
                                break;
                            }
                        }
                        let _ = client.send(Frame::Text(TRANSFER_COMPLETED.into())).await;
                    }
                    (server.await.expect("join"), payload)
                })
            })
            .collect();

        let mut recorded = Vec::new();
        for racer in racers {
            match racer.await.expect("join") {
                (Ok(file), payload) => recorded.push((file, payload)),
                (Err(err), _) => assert_eq!(err.kind(), ErrorKind::Validation, "round {round}: {err}"),
            }
        }
        assert_eq!(recorded.len(), 1, "round {round}");
        let (file, payload) = &recorded[0];
        assert!(h.store().join(&file.path).exists(), "round {round}: recorded file is missing");
        assert_eq!(&download(&h, &alice, &format!(r#"{{"id":{}}}"#, file.id)).await, payload);
    }

    let mut ctx = RequestContext::authenticated(alice);
    assert_eq!(h.files.list(&mut ctx).await.expect("list").len(), 20);
}

#[tokio::test]
async fn malformed_handshake_is_rejected() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;

    for first in [
        Frame::Text("not json".into()),
        Frame::Text(r#"{"file_name":"","size":3}"#.into()),
        Frame::Text(r#"{"file_name":"a.bin","size":0}"#.into()),
        Frame::Text(r#"{"file_name":"../escape","size":3}"#.into()),
        Frame::Binary(vec![1, 2, 3]),
    ] {
        let (mut client, server) = serve_upload(&h.engine, &alice);
        client.send(first).await.expect("send");
        let (code, reason) = expect_close(&mut client).await;
        assert_eq!(code, close_code::UNSUPPORTED_DATA);
        assert!(reason.is_some());
        assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn peer_disconnect_mid_upload_discards_the_file() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let (mut client, server) = serve_upload(&h.engine, &alice);

    send_text(&mut client, r#"{"file_name":"gone.bin","size":100}"#).await;
    expect_confirm(&mut client).await;
    client.send(Frame::Binary(vec![7; 50])).await.expect("send");
    drop(client);

    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Transport);
    let mut ctx = RequestContext::authenticated(alice.clone());
    assert!(h.files.list(&mut ctx).await.expect("list").is_empty());
    assert!(!h.store().join(alice.id.to_string()).join("gone.bin").exists());
}

#[tokio::test]
async fn duplicate_names_are_refused_per_owner() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let bob = user(&h.db, "bob").await;
    upload(&h, &alice, "notes.txt", b"first", 1024).await;

    let (mut client, server) = serve_upload(&h.engine, &alice);
    send_text(&mut client, r#"{"file_name":"notes.txt","size":6}"#).await;
    let (code, reason) = expect_close(&mut client).await;
    assert_eq!(code, close_code::UNSUPPORTED_DATA);
    assert_eq!(reason.expect("reason").message, "file already exists");
    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Validation);

    let theirs = upload(&h, &bob, "notes.txt", b"second", 1024).await;
    assert_eq!(theirs.size, 6);
    assert_eq!(download(&h, &alice, r#"{"file_name":"notes.txt"}"#).await, b"first");
}

#[tokio::test]
async fn unknown_downloads_close_with_not_found() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let bob = user(&h.db, "bob").await;
    let stored = upload(&h, &alice, "private.bin", b"alice only", 1024).await;

    let (mut client, server) = serve_download(&h.engine, &bob);
    send_text(&mut client, format!(r#"{{"id":{}}}"#, stored.id)).await;
    let (code, reason) = expect_close(&mut client).await;
    assert_eq!(code, close_code::UNSUPPORTED_DATA);
    assert_eq!(reason.expect("reason").message, "file not found");
    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn corrupt_files_fail_with_an_internal_close() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let stored = upload(&h, &alice, "fragile.bin", &sample(10_000), 1024).await;
    std::fs::write(h.store().join(alice.id.to_string()).join("fragile.bin"), b"garbage").expect("corrupt");

    let (mut client, server) = serve_download(&h.engine, &alice);
    send_text(&mut client, format!(r#"{{"id":{}}}"#, stored.id)).await;
    expect_confirm(&mut client).await;
    let close = loop {
        match next(&mut client).await {
            Frame::Binary(_) => {},
            Frame::Close(Some(frame)) => break frame,
            other => panic!("unexpected frame {other:?}"),
        }
    };
    assert_eq!(close.code, close_code::INTERNAL);
    let body: ErrorMessage = serde_json::from_str(&close.reason).expect("reason json");
    assert_eq!(body.message, "internal server error");
    assert_eq!(server.await.expect("join").unwrap_err().kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn delete_removes_file_and_record() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let stored = upload(&h, &alice, "bye.bin", b"soon gone", 1024).await;
    let path = h.store().join(alice.id.to_string()).join("bye.bin");
    assert!(path.exists());

    let mut ctx = RequestContext::authenticated(alice);
    assert_eq!(h.files.get(&mut ctx, stored.id).await.expect("get").size, 9);
    h.files.delete(&mut ctx, stored.id).await.expect("delete");

    assert!(!path.exists());
    assert_eq!(h.files.get(&mut ctx, stored.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(h.files.delete(&mut ctx, stored.id).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn delete_tolerates_a_missing_artifact() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let stored = upload(&h, &alice, "lost.bin", b"vanishing", 1024).await;
    std::fs::remove_file(h.store().join(alice.id.to_string()).join("lost.bin")).expect("remove");

    let mut ctx = RequestContext::authenticated(alice);
    h.files.delete(&mut ctx, stored.id).await.expect("delete");
    assert!(h.files.list(&mut ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn other_owners_cannot_delete() {
    let h = harness().await;
    let alice = user(&h.db, "alice").await;
    let bob = user(&h.db, "bob").await;
    let stored = upload(&h, &alice, "mine.bin", b"hands off", 1024).await;

    let mut ctx = RequestContext::authenticated(bob);
    assert_eq!(h.files.delete(&mut ctx, stored.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(h.store().join(alice.id.to_string()).join("mine.bin").exists());
}
