use async_trait::async_trait;

use crate::{
    domain::{GroupId, SessionUser, UserId},
    feed::{ChangeFilter, MessageHandler, SubscriptionId},
    Result,
};

/// Who is signed in right now.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means nobody is signed in.
    async fn current_user(&self) -> Result<Option<SessionUser>>;
}

/// Remote "get group for user" lookup.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn group_for_user(&self, user_id: &UserId) -> Result<Option<GroupId>>;
}

/// Push-based row change subscriptions.
///
/// Implementations deliver events for a subscription strictly in the order they
/// arrive and stop calling the handler once `unsubscribe` returns.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(
        &self,
        filter: ChangeFilter,
        handler: MessageHandler,
    ) -> Result<SubscriptionId>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

/// The view the user is looking at. Read synchronously whenever it matters.
pub trait NavigationLocation: Send + Sync {
    fn current_path(&self) -> String;
}
