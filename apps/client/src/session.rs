use crate::error::ClientError;
use reqwest::Url;

/// Where the server lives and who we are signed in as.
#[derive(Clone)]
pub struct Session {
    base: Url,
    token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl Session {
    /// Accepts a full URL or a bare `host:port`, which is taken as plain HTTP.
    ///
    /// # Errors
    /// [`ClientError::Usage`] when the address does not parse or is not HTTP(S).
    pub fn new(address: &str) -> Result<Self, ClientError> {
        let address = address.trim().trim_end_matches('/');
        let full = if address.contains("://") { address.to_owned() } else { format!("http://{address}") };
        let base = Url::parse(&format!("{full}/"))
            .map_err(|e| ClientError::usage(format!("server address {address:?}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::usage(format!("unsupported scheme {:?}", base.scheme())));
        }
        Ok(Self { base, token: None })
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn sign_in(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn sign_out(&mut self) {
        self.token = None;
    }

    /// HTTP URL of `path`, relative to the server root.
    ///
    /// # Errors
    /// [`ClientError::Usage`] for a path that cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::usage(format!("path {path:?}: {e}")))
    }

    /// WebSocket URL of `path`: `ws` for an HTTP server, `wss` for HTTPS.
    ///
    /// # Errors
    /// [`ClientError::Usage`] for a path that cannot be joined.
    pub fn socket_endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint(path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| ClientError::usage(format!("cannot switch {url} to {scheme}")))?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_default_to_http() {
        let session = Session::new("localhost:8080").unwrap();
        assert_eq!(session.endpoint("/api/card").unwrap().as_str(), "http://localhost:8080/api/card");
        assert_eq!(session.socket_endpoint("/api/file/upload").unwrap().as_str(), "ws://localhost:8080/api/file/upload");
    }

    #[test]
    fn https_servers_get_secure_sockets() {
        let session = Session::new("https://vault.example.com/").unwrap();
        assert_eq!(session.socket_endpoint("api/file/download").unwrap().scheme(), "wss");
    }

    #[test]
    fn other_schemes_are_refused() {
        assert!(matches!(Session::new("ftp://example.com"), Err(ClientError::Usage { .. })));
    }

    #[test]
    fn tokens_stay_out_of_debug_output() {
        let mut session = Session::new("localhost:1").unwrap();
        session.sign_in("header.payload.signature".into());
        assert!(session.is_authenticated());
        assert!(!format!("{session:?}").contains("signature"));
        session.sign_out();
        assert!(session.token().is_none());
    }
}
