use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, routes::RouteTable, Result};

pub const DEFAULT_CHAT_PATH: &str = "/chat";
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "global-chat-notifications";
pub const DEFAULT_GROUP_LOOKUP_RPC: &str = crate::schema::rpc::GET_USER_GROUP_ID;

/// Typed configuration for the client.
#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub access_token: Option<String>,

    // Notifications
    pub chat_path: String,
    pub notification_channel: String,
    pub group_lookup_rpc: String,
    pub initial_path: String,

    // Runtime constants
    pub http_timeout: Duration,
    pub realtime_heartbeat: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (env in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let supabase_url = lookup("SUPABASE_URL")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("SUPABASE_URL environment variable is required".to_string())
            })?;
        let supabase_anon_key = lookup("SUPABASE_ANON_KEY")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("SUPABASE_ANON_KEY environment variable is required".to_string())
            })?;

        let supabase_url = supabase_url.trim().trim_end_matches('/').to_string();
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "SUPABASE_URL must be an http(s) url, got {supabase_url}"
            )));
        }

        let access_token = lookup("SUPABASE_ACCESS_TOKEN").and_then(non_empty);

        let chat_path = lookup("CHAT_PATH")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_CHAT_PATH.to_string());
        if !chat_path.starts_with('/') {
            return Err(Error::Config(format!(
                "CHAT_PATH must start with '/', got {chat_path}"
            )));
        }
        let notification_channel = lookup("NOTIFICATION_CHANNEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_NOTIFICATION_CHANNEL.to_string());
        let group_lookup_rpc = lookup("GROUP_LOOKUP_RPC")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_GROUP_LOOKUP_RPC.to_string());
        let initial_path = lookup("INITIAL_PATH")
            .and_then(non_empty)
            .unwrap_or_else(|| "/home".to_string());

        // The chat view must be reachable, otherwise the location filter never applies.
        RouteTable::eurovision(&chat_path)?;

        let http_timeout = positive_millis("HTTP_TIMEOUT_MS", lookup("HTTP_TIMEOUT_MS"), 10_000)?;
        let realtime_heartbeat = positive_millis(
            "REALTIME_HEARTBEAT_MS",
            lookup("REALTIME_HEARTBEAT_MS"),
            30_000,
        )?;

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            access_token,
            chat_path,
            notification_channel,
            group_lookup_rpc,
            initial_path,
            http_timeout,
            realtime_heartbeat,
        })
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    /// WebSocket endpoint of the realtime service (`http` → `ws`, `https` → `wss`).
    pub fn realtime_url(&self) -> String {
        let base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.supabase_anon_key
        )
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn positive_millis(key: &str, v: Option<String>, default: u64) -> Result<Duration> {
    match parse_u64(v).unwrap_or(default) {
        0 => Err(Error::Config(format!("{key} must be greater than zero"))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
