//! Line-oriented navigation driver.
//!
//! Each input line is either a path to navigate to or one of `status`,
//! `clear`, `quit`. Every navigation re-runs `initialize()`, the way a view
//! mount would, and entering the chat view clears the unread counter.

use std::io::Write;

use anyhow::Context;
use eurovote_core::{location::SharedLocation, notifications::NotificationTracker};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub async fn run<R, W>(
    tracker: &NotificationTracker,
    location: &SharedLocation,
    input: R,
    mut out: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("read input")? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "status" => {
                writeln!(
                    out,
                    "phase={:?} unread={}",
                    tracker.phase(),
                    tracker.unread_count()
                )?;
            }
            "clear" => {
                tracker.clear_unread_count();
                writeln!(out, "unread cleared")?;
            }
            path if path.starts_with('/') => {
                let Some(route) = tracker.routes().resolve(path) else {
                    writeln!(out, "no view at {path}")?;
                    continue;
                };
                location.navigate(path);
                tracker.initialize().await;
                if tracker.is_chat_path(path) {
                    tracker.clear_unread_count();
                }
                writeln!(out, "-> {:?} {:?}", route.view, route.params)?;
            }
            other => {
                writeln!(out, "unknown command: {other}")?;
            }
        }
    }
    out.flush().context("flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eurovote_core::{
        domain::{GroupId, MessageEvent, SessionUser, UserId},
        feed::{ChangeFilter, MessageHandler, SubscriptionId},
        notifications::{TrackerPhase, TrackerSettings},
        ports::{AuthProvider, ChangeFeed, GroupResolver, NavigationLocation},
        routes::RouteTable,
        Result,
    };
    use std::sync::{Arc, Mutex};

    struct SignedIn;

    #[async_trait]
    impl AuthProvider for SignedIn {
        async fn current_user(&self) -> Result<Option<SessionUser>> {
            Ok(Some(SessionUser {
                id: UserId("u1".to_string()),
                email: None,
            }))
        }
    }

    struct InGroup;

    #[async_trait]
    impl GroupResolver for InGroup {
        async fn group_for_user(&self, _user_id: &UserId) -> Result<Option<GroupId>> {
            Ok(Some(GroupId("g1".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingFeed {
        handlers: Mutex<Vec<MessageHandler>>,
    }

    impl RecordingFeed {
        fn emit(&self, group: &str, sender: &str) {
            for h in self.handlers.lock().unwrap().iter() {
                h(MessageEvent::new(group, sender));
            }
        }
    }

    #[async_trait]
    impl ChangeFeed for RecordingFeed {
        async fn subscribe(
            &self,
            _filter: ChangeFilter,
            handler: MessageHandler,
        ) -> Result<SubscriptionId> {
            let mut handlers = self.handlers.lock().unwrap();
            handlers.push(handler);
            Ok(SubscriptionId(handlers.len() as u64))
        }

        async fn unsubscribe(&self, _id: SubscriptionId) -> Result<()> {
            self.handlers.lock().unwrap().clear();
            Ok(())
        }
    }

    fn setup() -> (NotificationTracker, Arc<RecordingFeed>, Arc<SharedLocation>) {
        let feed = Arc::new(RecordingFeed::default());
        let location = Arc::new(SharedLocation::new("/home"));
        let tracker = NotificationTracker::new(
            Arc::new(SignedIn),
            Arc::new(InGroup),
            feed.clone(),
            location.clone(),
            TrackerSettings {
                channel: "global-chat-notifications".to_string(),
                routes: Arc::new(RouteTable::eurovision("/chat").unwrap()),
            },
        );
        (tracker, feed, location)
    }

    async fn drive(
        tracker: &NotificationTracker,
        location: &SharedLocation,
        script: &str,
    ) -> String {
        let mut out = Vec::new();
        run(tracker, location, script.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn navigation_initializes_once_and_chat_clears() {
        let (tracker, feed, location) = setup();

        let out = drive(&tracker, &location, "/home\n/scores\n").await;
        assert!(out.contains("Home"));
        assert_eq!(tracker.phase(), TrackerPhase::Active);
        assert_eq!(feed.handlers.lock().unwrap().len(), 1);

        feed.emit("g1", "u2");
        feed.emit("g1", "u3");
        assert_eq!(tracker.unread_count(), 2);

        let out = drive(&tracker, &location, "/chat\nstatus\n").await;
        assert_eq!(location.current_path(), "/chat");
        assert!(out.contains("unread=0"), "got: {out}");

        feed.emit("g1", "u2");
        assert_eq!(tracker.unread_count(), 0);
    }

    #[tokio::test]
    async fn unknown_paths_do_not_navigate() {
        let (tracker, _feed, location) = setup();
        let out = drive(&tracker, &location, "/backstage\nhello\nquit\n/chat\n").await;

        assert!(out.contains("no view at /backstage"));
        assert!(out.contains("unknown command: hello"));
        assert_eq!(location.current_path(), "/home", "stops at quit");
        assert_eq!(tracker.phase(), TrackerPhase::Uninitialized);
    }

    #[tokio::test]
    async fn clear_command_resets_counter() {
        let (tracker, feed, location) = setup();
        drive(&tracker, &location, "/countries\n").await;
        feed.emit("g1", "u2");

        let out = drive(&tracker, &location, "clear\n").await;
        assert!(out.contains("unread cleared"));
        assert_eq!(tracker.unread_count(), 0);
    }
}
