use keeper_database::Database;
use keeper_domain::config::SecurityConfig;
use keeper_domain::identity::LoginRequest;
use keeper_identity::SessionManager;
use keeper_kernel::{ErrorKind, RequestContext};
use std::time::Duration;
use tempfile::TempDir;

async fn database() -> (TempDir, Database) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("identity.db").display());
    let db = Database::builder().url(url).init().await.expect("database");
    (dir, db)
}

fn manager(db: &Database, security: SecurityConfig) -> SessionManager {
    SessionManager::builder().database(db.clone()).security(security).build().expect("session manager")
}

fn alice() -> LoginRequest {
    LoginRequest { login: "alice".into(), password: "s3cret12".into() }
}

#[tokio::test]
async fn signup_then_signin_resolves_the_same_identity() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();

    let created = sessions.create_user(&mut ctx, &alice()).await.expect("signup");
    let token = sessions.create_token(&mut ctx, &alice()).await.expect("signin");

    let resolved = sessions.parse_token(&mut ctx, &token).await.expect("parse");
    assert_eq!(resolved, created);
    assert_eq!(resolved.login, "alice");
}

#[tokio::test]
async fn duplicate_login_is_reported() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();

    sessions.create_user(&mut ctx, &alice()).await.expect("first signup");
    let err = sessions.create_user(&mut ctx, &alice()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateLogin);
}

#[tokio::test]
async fn weak_credentials_are_rejected_before_hashing() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();

    let short = LoginRequest { login: "alice".into(), password: "short".into() };
    assert_eq!(sessions.create_user(&mut ctx, &short).await.unwrap_err().kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unknown_login_and_wrong_password_look_the_same() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();
    sessions.create_user(&mut ctx, &alice()).await.expect("signup");

    let wrong = LoginRequest { login: "alice".into(), password: "s3cret13".into() };
    let unknown = LoginRequest { login: "mallory".into(), password: "s3cret12".into() };

    let a = sessions.create_token(&mut ctx, &wrong).await.unwrap_err();
    let b = sessions.create_token(&mut ctx, &unknown).await.unwrap_err();
    assert_eq!(a.kind(), ErrorKind::Unauthorized);
    assert_eq!(a.to_string(), b.to_string());
}

#[tokio::test]
async fn cache_answers_without_the_database() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();
    sessions.create_user(&mut ctx, &alice()).await.expect("signup");
    let token = sessions.create_token(&mut ctx, &alice()).await.expect("signin");

    sqlx::query("DELETE FROM users").execute(db.pool()).await.expect("delete users");

    let cached = sessions.parse_token(&mut ctx, &token).await.expect("cached identity");
    assert_eq!(cached.login, "alice");
}

#[tokio::test]
async fn cache_miss_falls_back_to_the_database() {
    let (_dir, db) = database().await;
    let issuer = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();
    issuer.create_user(&mut ctx, &alice()).await.expect("signup");
    let token = issuer.create_token(&mut ctx, &alice()).await.expect("signin");

    // same keys, empty cache
    let fresh = manager(&db, SecurityConfig::default());
    assert_eq!(fresh.parse_token(&mut ctx, &token).await.expect("resolved").login, "alice");

    sqlx::query("DELETE FROM users").execute(db.pool()).await.expect("delete users");
    let other = manager(&db, SecurityConfig::default());
    let err = other.parse_token(&mut ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn expired_token_is_rejected_despite_cache_entry() {
    let (_dir, db) = database().await;
    let mut security = SecurityConfig::default();
    security.jwt.ttl_seconds = 1;
    let sessions = manager(&db, security);
    let mut ctx = RequestContext::anonymous();
    sessions.create_user(&mut ctx, &alice()).await.expect("signup");
    let token = sessions.create_token(&mut ctx, &alice()).await.expect("signin");
    assert!(sessions.parse_token(&mut ctx, &token).await.is_ok());

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let err = sessions.parse_token(&mut ctx, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn tokens_from_another_secret_are_rejected() {
    let (_dir, db) = database().await;
    let sessions = manager(&db, SecurityConfig::default());
    let mut ctx = RequestContext::anonymous();
    sessions.create_user(&mut ctx, &alice()).await.expect("signup");
    let token = sessions.create_token(&mut ctx, &alice()).await.expect("signin");

    let mut rotated = SecurityConfig::default();
    rotated.secret = "a completely different secret".into();
    let foreign = manager(&db, rotated);
    assert_eq!(foreign.parse_token(&mut ctx, &token).await.unwrap_err().kind(), ErrorKind::Unauthorized);

    let signature_at = token.rfind('.').expect("signed token") + 1;
    let flipped = if token.as_bytes()[signature_at] == b'A' { "B" } else { "A" };
    let mut tampered = token.clone();
    tampered.replace_range(signature_at..=signature_at, flipped);
    assert!(sessions.parse_token(&mut ctx, &tampered).await.is_err());
}

#[test]
fn builder_requires_a_database_and_positive_ttls() {
    assert!(SessionManager::builder().build().is_err());
}
