use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use eurovote_core::{
    domain::{SessionUser, UserId},
    ports::AuthProvider,
    Result,
};

use crate::{ensure_success, map_reqwest, SupabaseClient};

/// `GET /auth/v1/user` with the session's access token.
#[derive(Clone, Debug)]
pub struct SupabaseAuth {
    client: SupabaseClient,
    user_url: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient, auth_url: &str) -> Self {
        Self {
            client,
            user_url: format!("{auth_url}/user"),
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_user(&self) -> Result<Option<SessionUser>> {
        if !self.client.has_session() {
            return Ok(None);
        }

        let resp = self
            .client
            .get(&self.user_url)
            .send()
            .await
            .map_err(|e| map_reqwest("auth request error", e))?;

        // An expired or revoked session is just "nobody signed in".
        if matches!(
            resp.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!(status = %resp.status(), "session rejected by auth service");
            return Ok(None);
        }

        let body: serde_json::Value = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| map_reqwest("auth json error", e))?;
        parse_user(body)
    }
}

fn parse_user(body: serde_json::Value) -> Result<Option<SessionUser>> {
    let user: UserResponse = serde_json::from_value(body)?;
    if user.id.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(SessionUser {
        id: UserId(user.id),
        email: user.email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eurovote_core::errors::Error;
    use serde_json::json;

    #[test]
    fn parses_gotrue_user() {
        let user = parse_user(json!({
            "id": "7f1c2d1e-0000-4000-8000-000000000001",
            "aud": "authenticated",
            "email": "fan@example.com",
            "role": "authenticated"
        }))
        .unwrap()
        .unwrap();
        assert_eq!(user.id.0, "7f1c2d1e-0000-4000-8000-000000000001");
        assert_eq!(user.email.as_deref(), Some("fan@example.com"));
    }

    #[test]
    fn empty_id_means_no_user() {
        assert_eq!(parse_user(json!({ "id": "" })).unwrap(), None);
    }

    #[test]
    fn malformed_body_is_an_error() {
        let err = parse_user(json!({ "email": "x" })).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn no_access_token_is_unauthenticated_without_network() {
        let cfg = eurovote_core::config::Config::from_lookup(|k| match k {
            "SUPABASE_URL" => Some("http://127.0.0.1:9".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        })
        .unwrap();
        let auth = SupabaseAuth::new(SupabaseClient::new(&cfg).unwrap(), &cfg.auth_url());
        assert_eq!(auth.current_user().await.unwrap(), None);
    }
}
