use std::sync::RwLock;

use crate::ports::NavigationLocation;

/// In-process navigation state, updated by whatever drives the UI.
#[derive(Debug)]
pub struct SharedLocation {
    path: RwLock<String>,
}

impl SharedLocation {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            path: RwLock::new(initial.into()),
        }
    }

    /// Record a navigation and return the previous path.
    pub fn navigate(&self, path: impl Into<String>) -> String {
        let mut guard = self.path.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, path.into())
    }
}

impl Default for SharedLocation {
    fn default() -> Self {
        Self::new("/")
    }
}

impl NavigationLocation for SharedLocation {
    fn current_path(&self) -> String {
        self.path.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_replaces_and_returns_previous() {
        let loc = SharedLocation::new("/home");
        assert_eq!(loc.navigate("/chat"), "/home");
        assert_eq!(loc.current_path(), "/chat");
        assert_eq!(SharedLocation::default().current_path(), "/");
    }
}
