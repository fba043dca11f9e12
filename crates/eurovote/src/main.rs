use std::sync::Arc;

use eurovote_core::{
    config::Config,
    location::SharedLocation,
    notifications::{NotificationTracker, TrackerSettings},
};
use eurovote_supabase::{
    RealtimeConfig, RealtimeFeed, RpcGroupResolver, SupabaseAuth, SupabaseClient,
};
use tokio::io::BufReader;
use tracing::info;

mod shell;

#[tokio::main]
async fn main() -> Result<(), eurovote_core::Error> {
    eurovote_core::logging::init("eurovote")?;

    let cfg = Config::load()?;
    let client = SupabaseClient::new(&cfg)?;
    let location = Arc::new(SharedLocation::new(cfg.initial_path.clone()));

    let tracker = Arc::new(NotificationTracker::new(
        Arc::new(SupabaseAuth::new(client.clone(), &cfg.auth_url())),
        Arc::new(RpcGroupResolver::new(
            client,
            &cfg.rest_url(),
            &cfg.group_lookup_rpc,
        )),
        Arc::new(RealtimeFeed::new(RealtimeConfig::from_config(&cfg))),
        location.clone(),
        TrackerSettings::from_config(&cfg)?,
    ));

    let outcome = tracker.initialize().await;
    info!(?outcome, path = %cfg.initial_path, "client started");

    let mut unread = tracker.watch_unread();
    let badge = tokio::spawn(async move {
        while unread.changed().await.is_ok() {
            let n = *unread.borrow_and_update();
            println!("[unread: {n}]");
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = shell::run(&tracker, &location, input, std::io::stdout()) => {
            res.map_err(|e| eurovote_core::Error::External(format!("shell failed: {e:#}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        }
    }

    tracker.cleanup().await;
    badge.abort();
    Ok(())
}
