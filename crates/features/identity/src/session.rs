use crate::error::IdentityError;
use crate::password;
use crate::repository::UserRepository;
use crate::token::TokenCodec;
use keeper_cipher::derive_key;
use keeper_database::Database;
use keeper_domain::config::SecurityConfig;
use keeper_domain::identity::{LoginRequest, Principal};
use keeper_kernel::{KeeperError, RequestContext};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const JWT_KEY_LABEL: &str = "keeper:jwt:v1";
const INVALID_CREDENTIALS: &str = "invalid login or password";

#[derive(Debug)]
struct SessionManagerInner {
    users: UserRepository,
    tokens: TokenCodec,
    cache: Cache<String, Principal>,
}

/// Registers users, signs them in and resolves session tokens.
///
/// Resolution is two-tier: a token is always verified cryptographically first,
/// then looked up in a TTL-bound cache, and only on a miss in the database.
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    /// Hashes the password and stores a new user.
    ///
    /// # Errors
    /// * [`KeeperError::Validation`] for a short login or password.
    /// * [`KeeperError::DuplicateLogin`] when the login is taken.
    #[instrument(skip_all, fields(login = %request.login))]
    pub async fn create_user(
        &self,
        ctx: &mut RequestContext,
        request: &LoginRequest,
    ) -> Result<Principal, KeeperError> {
        request.validate()?;
        let hash = password::hash_password(request.password.clone()).await?;

        match self.inner.users.create(ctx.db(), &request.login, &hash).await {
            Ok(user) => {
                info!(user_id = user.id, "User registered");
                Ok(Principal::from(&user))
            },
            Err(e) if e.is_unique_violation() => {
                Err(KeeperError::duplicate_login(format!("login '{}' is already taken", request.login)))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Verifies the password and mints a token. The identity is cached right away.
    ///
    /// # Errors
    /// [`KeeperError::Unauthorized`] for an unknown login or a wrong password,
    /// without telling the two apart.
    #[instrument(skip_all, fields(login = %request.login))]
    pub async fn create_token(
        &self,
        ctx: &mut RequestContext,
        request: &LoginRequest,
    ) -> Result<String, KeeperError> {
        let Some(user) = self.inner.users.find_by_login(ctx.db(), &request.login).await? else {
            debug!("Unknown login");
            return Err(KeeperError::unauthorized(INVALID_CREDENTIALS));
        };
        if !password::verify_password(request.password.clone(), user.password_hash.clone()).await? {
            warn!(user_id = user.id, "Password mismatch");
            return Err(KeeperError::unauthorized(INVALID_CREDENTIALS));
        }

        let token = self.inner.tokens.issue(&user.login)?;
        self.inner.cache.insert(token.clone(), Principal::from(&user)).await;
        Ok(token)
    }

    /// Resolves a token to its owner.
    ///
    /// # Errors
    /// [`KeeperError::Unauthorized`] for a bad signature, a foreign algorithm, an
    /// expired token or a login that no longer exists.
    pub async fn parse_token(&self, ctx: &mut RequestContext, token: &str) -> Result<Principal, KeeperError> {
        let claims = self.inner.tokens.verify(token)?;

        if let Some(principal) = self.inner.cache.get(token).await {
            return Ok(principal);
        }

        let user = self
            .inner
            .users
            .find_by_login(ctx.db(), &claims.login)
            .await?
            .ok_or_else(|| KeeperError::unauthorized("session user no longer exists"))?;

        let principal = Principal::from(&user);
        self.inner.cache.insert(token.to_owned(), principal.clone()).await;
        debug!(user_id = principal.id, "Session cache refilled");
        Ok(principal)
    }
}

#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct SessionManagerBuilder {
    database: Option<Database>,
    security: Option<SecurityConfig>,
}

impl SessionManagerBuilder {
    pub fn database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.security = Some(security);
        self
    }

    /// # Errors
    /// [`IdentityError::Config`] for a missing database, a zero TTL or an empty secret.
    pub fn build(self) -> Result<SessionManager, IdentityError> {
        let config = |message: &'static str| IdentityError::Config { message: message.into(), context: None };

        let database = self.database.ok_or_else(|| config("database not provided"))?;
        let security = self.security.unwrap_or_default();
        if security.jwt.ttl_seconds == 0 {
            return Err(config("jwt.ttl_seconds must be greater than zero"));
        }
        if security.session_cache.ttl_seconds == 0 {
            return Err(config("session_cache.ttl_seconds must be greater than zero"));
        }

        let key = derive_key(&security.secret, &security.salt, JWT_KEY_LABEL).map_err(|e| {
            IdentityError::Config { message: e.to_string().into(), context: Some("Deriving JWT key".into()) }
        })?;
        let tokens = TokenCodec::new(
            &key,
            Duration::from_secs(security.jwt.ttl_seconds),
            Duration::from_secs(security.jwt.leeway_seconds),
        );

        let cache = Cache::builder()
            .max_capacity(security.session_cache.capacity)
            .time_to_live(Duration::from_secs(security.session_cache.ttl_seconds))
            .build();

        Ok(SessionManager {
            inner: Arc::new(SessionManagerInner { users: UserRepository::new(database), tokens, cache }),
        })
    }
}
