use async_trait::async_trait;
use serde_json::{json, Value};

use eurovote_core::{
    domain::{GroupId, UserId},
    errors::Error,
    ports::GroupResolver,
    Result,
};

use crate::{ensure_success, map_reqwest, SupabaseClient};

/// Group lookup through a Postgres function (`POST /rest/v1/rpc/<name>`).
#[derive(Clone, Debug)]
pub struct RpcGroupResolver {
    client: SupabaseClient,
    url: String,
}

impl RpcGroupResolver {
    pub fn new(client: SupabaseClient, rest_url: &str, function: &str) -> Self {
        Self {
            client,
            url: format!("{rest_url}/rpc/{function}"),
        }
    }
}

#[async_trait]
impl GroupResolver for RpcGroupResolver {
    async fn group_for_user(&self, user_id: &UserId) -> Result<Option<GroupId>> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "user_id": user_id.0 }))
            .send()
            .await
            .map_err(|e| map_reqwest("group lookup request error", e))?;

        let body: Value = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| map_reqwest("group lookup json error", e))?;
        parse_group(body)
    }
}

/// The function returns a scalar uuid, or `null` for users outside any group.
fn parse_group(body: Value) -> Result<Option<GroupId>> {
    match body {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(GroupId(s))),
        // Some PostgREST setups wrap scalars as `[{"get_user_group_id": ...}]`.
        Value::Array(mut rows) if rows.len() <= 1 => match rows.pop() {
            None => Ok(None),
            Some(Value::Object(obj)) if obj.len() == 1 => {
                parse_group(obj.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null))
            }
            Some(other) => parse_group(other),
        },
        other => Err(Error::External(format!(
            "unexpected group lookup response: {}",
            other.to_string().chars().take(200).collect::<String>()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_uuid_is_the_group() {
        assert_eq!(
            parse_group(json!("a3c1")).unwrap(),
            Some(GroupId("a3c1".to_string()))
        );
    }

    #[test]
    fn null_or_blank_means_no_group() {
        assert_eq!(parse_group(Value::Null).unwrap(), None);
        assert_eq!(parse_group(json!("  ")).unwrap(), None);
        assert_eq!(parse_group(json!([])).unwrap(), None);
    }

    #[test]
    fn wrapped_row_is_unwrapped() {
        assert_eq!(
            parse_group(json!([{ "get_user_group_id": "g9" }])).unwrap(),
            Some(GroupId("g9".to_string()))
        );
        assert_eq!(
            parse_group(json!([{ "get_user_group_id": null }])).unwrap(),
            None
        );
    }

    #[test]
    fn other_shapes_are_errors() {
        assert!(parse_group(json!(42)).is_err());
        assert!(parse_group(json!({ "group": "g1", "extra": 1 })).is_err());
    }

    #[test]
    fn url_targets_the_configured_function() {
        let cfg = eurovote_core::config::Config::from_lookup(|k| match k {
            "SUPABASE_URL" => Some("https://abc.supabase.co".to_string()),
            "SUPABASE_ANON_KEY" => Some("anon".to_string()),
            _ => None,
        })
        .unwrap();
        let resolver = RpcGroupResolver::new(
            SupabaseClient::new(&cfg).unwrap(),
            &cfg.rest_url(),
            &cfg.group_lookup_rpc,
        );
        assert_eq!(
            resolver.url,
            "https://abc.supabase.co/rest/v1/rpc/get_user_group_id"
        );
    }
}
