use keeper_client::{ApiClient, ClientError, Flow, Session, shell};
use keeper_domain::config::ApiConfig;
use keeper_domain::secret::{Credential, TextNote};
use keeper_server::Server;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct Running {
    dir: TempDir,
    address: String,
}

async fn serve() -> Running {
    let dir = TempDir::new().expect("temp dir");
    let mut cfg = ApiConfig::default();
    cfg.database.url = format!("sqlite://{}", dir.path().join("client.db").display());
    cfg.storage.data_dir = dir.path().join("files");
    cfg.security.secret = "client-test-secret".into();

    let server = Server::builder().config(cfg).build().await.expect("server");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener");
    let address = listener.local_addr().expect("address").to_string();
    tokio::spawn(axum::serve(listener, server.router()).into_future());
    Running { dir, address }
}

async fn signed_up(running: &Running, login: &str) -> ApiClient {
    let mut api = ApiClient::new(Session::new(&running.address).expect("session")).expect("client");
    api.sign_up(login, "s3cret-pass").await.expect("signup");
    api
}

fn rejected_status(err: &ClientError) -> Option<&str> {
    match err {
        ClientError::Rejected { context, .. } => context.as_deref(),
        _ => None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn secrets_round_trip_over_http() {
    let running = serve().await;
    let api = signed_up(&running, "alice").await;

    let created = api.create(&Credential { login: "mail".into(), password: "hunter22".into() }).await.expect("create");
    let listed = api.list::<Credential>().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].data.password, "hunter22");

    let updated = api
        .modify(created.id, |current: &mut Credential| current.password = "correct-horse".into())
        .await
        .expect("modify");
    assert_eq!(updated.version, created.version + 1);
    assert_eq!(updated.data.login, "mail");

    let stale = api.update(created.id, created.version, updated.data.clone()).await.unwrap_err();
    assert_eq!(rejected_status(&stale), Some("409"));

    api.delete::<Credential>(created.id).await.expect("delete");
    let missing = api.get::<Credential>(created.id).await.unwrap_err();
    assert_eq!(rejected_status(&missing), Some("404"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_without_a_session_are_unauthorized() {
    let running = serve().await;
    let api = ApiClient::new(Session::new(&running.address).expect("session")).expect("client");
    assert!(api.list::<TextNote>().await.unwrap_err().is_unauthorized());

    let mut wrong = ApiClient::new(Session::new(&running.address).expect("session")).expect("client");
    signed_up(&running, "bob").await;
    assert!(wrong.sign_in("bob", "not-the-password").await.unwrap_err().is_unauthorized());
    assert!(!wrong.session().is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_travel_over_websockets() {
    let running = serve().await;
    let api = signed_up(&running, "carol").await;

    let source = running.dir.path().join("report.bin");
    let payload: Vec<u8> = (0..5_000u32).map(|i| u8::try_from(i % 253).unwrap()).collect();
    tokio::fs::write(&source, &payload).await.unwrap();

    api.upload("report.bin", &source).await.expect("upload");
    let files = api.files().await.expect("files");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].size, 5_000);

    let target = running.dir.path().join("downloads");
    tokio::fs::create_dir(&target).await.unwrap();
    let saved = api.download(files[0].id, &target).await.expect("download");
    assert_eq!(saved, target.join("report.bin"));
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), payload);

    let again = api.upload("report.bin", &source).await.unwrap_err();
    match again {
        ClientError::Rejected { message, context } => {
            assert_eq!(message, "file already exists");
            assert_eq!(context.as_deref(), Some("1003"));
        },
        other => panic!("unexpected {other:?}"),
    }

    api.delete_file(files[0].id).await.expect("delete");
    assert!(api.files().await.expect("files").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn socket_transfers_need_a_session() {
    let running = serve().await;
    let api = ApiClient::new(Session::new(&running.address).expect("session")).expect("client");
    let source = running.dir.path().join("note.txt");
    tokio::fs::write(&source, b"hi").await.unwrap();
    assert!(api.upload("note.txt", &source).await.unwrap_err().is_unauthorized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shell_lines_drive_the_session() {
    let running = serve().await;
    let mut api = ApiClient::new(Session::new(&running.address).expect("session")).expect("client");
    let mut out = Vec::new();

    assert_eq!(shell::step(&mut api, "registration dave s3cret-pass", &mut out).await.unwrap(), Flow::Continue);
    assert!(api.session().is_authenticated());
    shell::step(&mut api, "text create remember the milk", &mut out).await.unwrap();
    shell::step(&mut api, "text list", &mut out).await.unwrap();
    shell::step(&mut api, "card create 123", &mut out).await.unwrap();
    shell::step(&mut api, "credential get 99", &mut out).await.unwrap();

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("Signed up as dave"));
    assert!(printed.contains("remember the milk"));
    assert!(printed.contains("Usage"), "clap usage for a short card create: {printed}");
    assert!(printed.contains("Error:"), "missing record reported: {printed}");

    let mut out = Vec::new();
    shell::step(&mut api, "logout", &mut out).await.unwrap();
    assert!(!api.session().is_authenticated());
    assert_eq!(shell::step(&mut api, "exit", &mut out).await.unwrap(), Flow::Exit);
}
