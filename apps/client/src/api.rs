//! Typed calls to the keeper HTTP surface.

use crate::error::{ClientError, ClientErrorExt};
use crate::session::Session;
use crate::socket::SocketTransport;
use crate::transfer;
use keeper_domain::file::{BinaryFile, DownloadRequest, ErrorMessage, FileId};
use keeper_domain::identity::{LoginRequest, TokenResponse};
use keeper_domain::secret::{Card, Credential, Revision, Secret, SecretId, TextNote, Version};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A secret kind and the route that serves it.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    const PATH: &'static str;
}

impl Resource for Credential {
    const PATH: &'static str = "/api/credential";
}

impl Resource for Card {
    const PATH: &'static str = "/api/card";
}

impl Resource for TextNote {
    const PATH: &'static str = "/api/text";
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    session: Session,
}

impl ApiClient {
    /// # Errors
    /// [`ClientError::Http`] when the HTTP client cannot be set up.
    pub fn new(session: Session) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("keeper-client/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Building the HTTP client")?;
        Ok(Self { http, session })
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub fn sign_out(&mut self) {
        self.session.sign_out();
    }

    /// Registers a new account and keeps its session.
    ///
    /// # Errors
    /// [`ClientError::Rejected`] for a taken login or a rejected password.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&mut self, login: &str, password: &str) -> Result<(), ClientError> {
        self.authenticate("/api/signup", login, password).await
    }

    /// # Errors
    /// [`ClientError::Unauthorized`] for a wrong login or password.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&mut self, login: &str, password: &str) -> Result<(), ClientError> {
        self.authenticate("/api/signin", login, password).await
    }

    async fn authenticate(&mut self, path: &str, login: &str, password: &str) -> Result<(), ClientError> {
        let body = LoginRequest { login: login.to_owned(), password: password.to_owned() };
        let request = self.http.post(self.session.endpoint(path)?).json(&body);
        let TokenResponse { token } = read_json(request.send().await.context("Sending credentials")?).await?;
        self.session.sign_in(token);
        info!("Signed in");
        Ok(())
    }

    /// # Errors
    /// [`ClientError::Unauthorized`] without a valid session.
    pub async fn list<R: Resource>(&self) -> Result<Vec<Secret<R>>, ClientError> {
        read_json(self.send(Method::GET, R::PATH, None::<&()>).await?).await
    }

    /// # Errors
    /// [`ClientError::Rejected`] with status 404 when no such record is ours.
    pub async fn get<R: Resource>(&self, id: SecretId) -> Result<Secret<R>, ClientError> {
        read_json(self.send(Method::GET, &format!("{}/{id}", R::PATH), None::<&()>).await?).await
    }

    /// # Errors
    /// [`ClientError::Rejected`] with status 400 when a field is refused.
    pub async fn create<R: Resource>(&self, data: &R) -> Result<Secret<R>, ClientError> {
        read_json(self.send(Method::POST, R::PATH, Some(data)).await?).await
    }

    /// Replaces the record if `version` is still the stored one.
    ///
    /// # Errors
    /// [`ClientError::Rejected`] with status 409 when someone else updated it first.
    pub async fn update<R: Resource>(&self, id: SecretId, version: Version, data: R) -> Result<Secret<R>, ClientError> {
        let revision = Revision { id, version, data };
        read_json(self.send(Method::PUT, &format!("{}/{id}", R::PATH), Some(&revision)).await?).await
    }

    /// Reads the record, applies `edit` and writes it back at the version read.
    ///
    /// # Errors
    /// As [`get`](Self::get) and [`update`](Self::update).
    pub async fn modify<R: Resource>(&self, id: SecretId, edit: impl FnOnce(&mut R)) -> Result<Secret<R>, ClientError> {
        let Secret { version, mut data, .. } = self.get::<R>(id).await?;
        edit(&mut data);
        self.update(id, version, data).await
    }

    /// # Errors
    /// [`ClientError::Rejected`] with status 404 when no such record is ours.
    pub async fn delete<R: Resource>(&self, id: SecretId) -> Result<(), ClientError> {
        expect_success(self.send(Method::DELETE, &format!("{}/{id}", R::PATH), None::<&()>).await?).await
    }

    /// # Errors
    /// [`ClientError::Unauthorized`] without a valid session.
    pub async fn files(&self) -> Result<Vec<BinaryFile>, ClientError> {
        read_json(self.send(Method::GET, "/api/file", None::<&()>).await?).await
    }

    /// # Errors
    /// [`ClientError::Rejected`] with status 404 when no such file is ours.
    pub async fn file(&self, id: FileId) -> Result<BinaryFile, ClientError> {
        read_json(self.send(Method::GET, &format!("/api/file/{id}"), None::<&()>).await?).await
    }

    /// # Errors
    /// [`ClientError::Rejected`] with status 404 when no such file is ours.
    pub async fn delete_file(&self, id: FileId) -> Result<(), ClientError> {
        expect_success(self.send(Method::DELETE, &format!("/api/file/{id}"), None::<&()>).await?).await
    }

    /// Uploads the local file at `source` under `file_name`.
    ///
    /// # Errors
    /// [`ClientError::Io`] when the file cannot be read, [`ClientError::Rejected`]
    /// when the server refuses or fails to store it.
    #[instrument(skip(self, source), fields(source = %source.display()))]
    pub async fn upload(&self, file_name: &str, source: &Path) -> Result<(), ClientError> {
        let file = fs::File::open(source).await.context(format!("Opening {}", source.display()))?;
        let size = file.metadata().await.context("Reading file size")?.len();
        if size == 0 {
            return Err(ClientError::usage("empty files cannot be stored"));
        }
        let mut socket = SocketTransport::connect(&self.session, "/api/file/upload").await?;
        transfer::send_file(&mut socket, file_name, size, file).await?;
        info!(size, "Upload finished");
        Ok(())
    }

    /// Downloads file `id` into `directory` under its stored name and returns the
    /// local path. A partial file is removed on failure.
    ///
    /// # Errors
    /// [`ClientError::Rejected`] when the server has no such file or cannot read
    /// it, [`ClientError::Io`] when the local file cannot be written.
    #[instrument(skip(self, directory))]
    pub async fn download(&self, id: FileId, directory: &Path) -> Result<PathBuf, ClientError> {
        let record = self.file(id).await?;
        let name = Path::new(&record.file_name)
            .file_name()
            .ok_or_else(|| ClientError::transfer(format!("unusable file name {:?}", record.file_name)))?;
        let target = directory.join(name);
        let mut file = fs::File::create(&target).await.context(format!("Creating {}", target.display()))?;

        let request = DownloadRequest { id: Some(record.id), file_name: record.file_name };
        let mut socket = SocketTransport::connect(&self.session, "/api/file/download").await?;
        match transfer::receive_file(&mut socket, &request, &mut file).await {
            Ok(received) => {
                file.sync_all().await.context("Syncing download")?;
                info!(received, path = %target.display(), "Download finished");
                Ok(target)
            },
            Err(err) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&target).await {
                    debug!(error = %cleanup, "Partial download not removed");
                }
                Err(err)
            },
        }
    }

    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response, ClientError> {
        let token = self
            .session
            .token()
            .ok_or_else(|| ClientError::Unauthorized { message: "sign in first".into(), context: None })?;
        let mut request: RequestBuilder = self.http.request(method, self.session.endpoint(path)?).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.context(format!("Calling {path}"))
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = check(response).await?;
    response.json().await.context("Decoding the response")
}

async fn expect_success(response: Response) -> Result<(), ClientError> {
    check(response).await.map(drop)
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorMessage>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_owned(),
    };
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized { message: message.into(), context: None });
    }
    Err(ClientError::rejected(message, status.as_u16()))
}
