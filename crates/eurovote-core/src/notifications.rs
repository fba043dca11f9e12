//! Unread chat notifications.
//!
//! The tracker resolves who is signed in and which group they chat in, opens a
//! single insert subscription on `messages`, and bumps an unread counter for
//! every message from someone else in the same group that arrives while the
//! user is not looking at the chat view.
//!
//! Resolution failures are logged and leave the tracker dormant: a missing
//! badge must never get in the way of navigation or chat.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{Membership, MessageEvent},
    feed::{ChangeFilter, MessageHandler, SubscriptionId},
    ports::{AuthProvider, ChangeFeed, GroupResolver, NavigationLocation},
    routes::{RouteTable, View},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerPhase {
    Uninitialized,
    Resolving,
    Active,
    CleanedUp,
}

/// Result of [`NotificationTracker::initialize`]. Callers are free to ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Subscribed,
    AlreadyActive,
    Unauthenticated,
    NoGroup,
    /// Auth, group lookup or feed subscription failed.
    Unavailable,
}

#[derive(Clone, Debug)]
pub struct TrackerSettings {
    pub channel: String,
    pub routes: Arc<RouteTable>,
}

impl TrackerSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            channel: cfg.notification_channel.clone(),
            routes: Arc::new(RouteTable::eurovision(&cfg.chat_path)?),
        })
    }
}

struct ActiveSubscription {
    id: SubscriptionId,
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct TrackerState {
    membership: Option<Membership>,
    subscription: Option<ActiveSubscription>,
}

/// Decides, per delivered message, whether it counts as unread.
struct UnreadFilter {
    membership: Membership,
    routes: Arc<RouteTable>,
    location: Arc<dyn NavigationLocation>,
    unread: Arc<watch::Sender<u64>>,
    live: Arc<AtomicBool>,
}

impl UnreadFilter {
    fn qualifies(&self, ev: &MessageEvent) -> bool {
        ev.group_id == self.membership.group_id
            && ev.sender_id != self.membership.user_id
            && !self
                .routes
                .is_view(&self.location.current_path(), View::Chat)
    }

    fn handle(&self, ev: MessageEvent) {
        if !self.live.load(Ordering::Acquire) {
            return;
        }
        if self.qualifies(&ev) {
            self.unread.send_modify(|n| *n = n.saturating_add(1));
            debug!(
                group_id = %ev.group_id,
                sender_id = %ev.sender_id,
                unread = *self.unread.borrow(),
                "unread message"
            );
        }
    }
}

/// Per-session notification context.
///
/// Owned by the composition root and shared by `Arc`; each instance keeps its
/// own counter and subscription.
pub struct NotificationTracker {
    auth: Arc<dyn AuthProvider>,
    groups: Arc<dyn GroupResolver>,
    feed: Arc<dyn ChangeFeed>,
    location: Arc<dyn NavigationLocation>,
    settings: TrackerSettings,
    unread: Arc<watch::Sender<u64>>,
    phase: watch::Sender<TrackerPhase>,
    state: Mutex<TrackerState>,
}

impl NotificationTracker {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        groups: Arc<dyn GroupResolver>,
        feed: Arc<dyn ChangeFeed>,
        location: Arc<dyn NavigationLocation>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            auth,
            groups,
            feed,
            location,
            settings,
            unread: Arc::new(watch::Sender::new(0)),
            phase: watch::Sender::new(TrackerPhase::Uninitialized),
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn unread_count(&self) -> u64 {
        *self.unread.borrow()
    }

    /// Live view of the counter for UI layers.
    pub fn watch_unread(&self) -> watch::Receiver<u64> {
        self.unread.subscribe()
    }

    pub fn phase(&self) -> TrackerPhase {
        *self.phase.borrow()
    }

    /// Identity and group captured at activation. Not refreshed while active,
    /// so a mid-session group change goes unnoticed until re-initialization.
    pub async fn membership(&self) -> Option<Membership> {
        self.state.lock().await.membership.clone()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.settings.routes
    }

    pub fn is_chat_path(&self, path: &str) -> bool {
        self.settings.routes.is_view(path, View::Chat)
    }

    /// Resolve identity and group, then open the message subscription.
    ///
    /// No-op while a subscription is open. Concurrent callers are serialized,
    /// so at most one subscription is ever opened.
    pub async fn initialize(&self) -> InitOutcome {
        let mut st = self.state.lock().await;
        if st.subscription.is_some() {
            return InitOutcome::AlreadyActive;
        }

        self.phase.send_replace(TrackerPhase::Resolving);
        let outcome = self.activate(&mut st).await;
        if outcome == InitOutcome::Subscribed {
            self.phase.send_replace(TrackerPhase::Active);
        } else {
            self.phase.send_replace(TrackerPhase::Uninitialized);
        }
        outcome
    }

    async fn activate(&self, st: &mut TrackerState) -> InitOutcome {
        let user = match self.auth.current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!("no signed-in user; chat notifications disabled");
                return InitOutcome::Unauthenticated;
            }
            Err(e) => {
                warn!(error = %e, "auth lookup failed; chat notifications disabled");
                return InitOutcome::Unavailable;
            }
        };

        let group_id = match self.groups.group_for_user(&user.id).await {
            Ok(Some(group_id)) => group_id,
            Ok(None) => {
                info!(user_id = %user.id, "user has no group; chat notifications disabled");
                return InitOutcome::NoGroup;
            }
            Err(e) => {
                warn!(
                    user_id = %user.id,
                    error = %e,
                    "group lookup failed; chat notifications disabled"
                );
                return InitOutcome::Unavailable;
            }
        };

        let membership = Membership {
            user_id: user.id,
            group_id,
        };
        let live = Arc::new(AtomicBool::new(true));
        let filter = Arc::new(UnreadFilter {
            membership: membership.clone(),
            routes: self.settings.routes.clone(),
            location: self.location.clone(),
            unread: self.unread.clone(),
            live: live.clone(),
        });
        let handler: MessageHandler = Arc::new(move |ev| filter.handle(ev));

        let id = match self
            .feed
            .subscribe(ChangeFilter::message_inserts(&self.settings.channel), handler)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                live.store(false, Ordering::Release);
                warn!(error = %e, "message subscription failed; chat notifications disabled");
                return InitOutcome::Unavailable;
            }
        };

        info!(
            user_id = %membership.user_id,
            group_id = %membership.group_id,
            subscription = %id,
            "chat notifications active"
        );
        st.membership = Some(membership);
        st.subscription = Some(ActiveSubscription { id, live });
        InitOutcome::Subscribed
    }

    pub fn clear_unread_count(&self) {
        self.unread.send_replace(0);
    }

    /// Release the subscription, if any. The counter keeps its value.
    pub async fn cleanup(&self) {
        let mut st = self.state.lock().await;
        let Some(sub) = st.subscription.take() else {
            return;
        };
        st.membership = None;
        sub.live.store(false, Ordering::Release);

        if let Err(e) = self.feed.unsubscribe(sub.id).await {
            warn!(subscription = %sub.id, error = %e, "unsubscribe failed");
        }
        self.phase.send_replace(TrackerPhase::CleanedUp);
        info!(subscription = %sub.id, "chat notifications stopped");
    }
}
