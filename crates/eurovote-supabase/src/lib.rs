//! Supabase adapters.
//!
//! Implements the `eurovote-core` ports over the hosted backend: GoTrue for the
//! signed-in user, PostgREST RPC for the group lookup, and the realtime service
//! (Phoenix channels over WebSocket) for the message change feed.

pub mod auth;
pub mod realtime;
pub mod rpc;

use eurovote_core::{config::Config, errors::Error, Result};

pub use auth::SupabaseAuth;
pub use realtime::{RealtimeConfig, RealtimeFeed};
pub use rpc::RpcGroupResolver;

/// Shared HTTP plumbing for the REST-style adapters.
#[derive(Clone, Debug)]
pub struct SupabaseClient {
    http: reqwest::Client,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            anon_key: cfg.supabase_anon_key.clone(),
            access_token: cfg.access_token.clone(),
        })
    }

    /// Token sent as `Authorization`: the user's JWT when signed in, else the anon key.
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    pub fn has_session(&self) -> bool {
        self.access_token.is_some()
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }
}

pub(crate) fn map_reqwest(context: &str, e: reqwest::Error) -> Error {
    Error::External(format!("{context}: {e}"))
}

/// Turn a non-success response into `Error::Http`, keeping a short body excerpt.
pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Http {
        status,
        body: body.chars().take(200).collect(),
    })
}
