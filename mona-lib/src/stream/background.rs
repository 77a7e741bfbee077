//! Maps app lifecycle signals onto the stream client's background mode.

use super::client::StreamClient;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// Lifecycle signal reported by the host app.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Resumed,
    Paused,
    Stopped,
    Hidden,
}

impl LifecycleEvent {
    pub fn is_foreground(&self) -> bool {
        *self == Self::Resumed
    }
}

struct ControllerState {
    current: LifecycleEvent,
    custom_tab_open: bool,
    background_active: bool,
}

/// Decides when the stream client is in background mode.
///
/// Background mode is on while the app is not resumed or while a custom tab
/// is open in front of it.
pub struct BackgroundModeController {
    client: StreamClient,
    state: Mutex<ControllerState>,
}

impl BackgroundModeController {
    pub fn new(client: StreamClient) -> Self {
        Self {
            client,
            state: Mutex::new(ControllerState {
                current: LifecycleEvent::Resumed,
                custom_tab_open: false,
                background_active: false,
            }),
        }
    }

    /// Apply a lifecycle signal. Returns true if background mode changed.
    pub fn on_lifecycle_event(&self, event: LifecycleEvent) -> bool {
        let mut state = self.lock_state();
        if state.current == event {
            return false;
        }
        debug!(from = ?state.current, to = ?event, "Lifecycle change");
        state.current = event;
        self.reconcile(&mut state)
    }

    /// Record whether a custom tab is showing. Returns true if background
    /// mode changed.
    pub fn set_custom_tab_open(&self, open: bool) -> bool {
        let mut state = self.lock_state();
        if state.custom_tab_open == open {
            return false;
        }
        debug!(open, "Custom tab visibility");
        state.custom_tab_open = open;
        self.reconcile(&mut state)
    }

    pub fn is_background_active(&self) -> bool {
        self.lock_state().background_active
    }

    pub fn is_custom_tab_open(&self) -> bool {
        self.lock_state().custom_tab_open
    }

    pub fn current_state(&self) -> LifecycleEvent {
        self.lock_state().current
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reconcile(&self, state: &mut ControllerState) -> bool {
        let wanted = state.custom_tab_open || !state.current.is_foreground();
        if wanted == state.background_active {
            return false;
        }
        state.background_active = wanted;
        if wanted {
            self.client.enter_background();
        } else {
            self.client.exit_background();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::test_utils::MockEventTransport;
    use std::sync::Arc;

    fn controller() -> BackgroundModeController {
        let client = StreamClient::new(
            StreamConfig::new("https://rtdb.test"),
            Arc::new(MockEventTransport::new()),
        );
        BackgroundModeController::new(client)
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let controller = controller();
        assert!(controller.on_lifecycle_event(LifecycleEvent::Paused));
        assert!(controller.is_background_active());
        assert!(controller.client.is_in_background());

        // already backgrounded
        assert!(!controller.on_lifecycle_event(LifecycleEvent::Stopped));
        assert!(!controller.on_lifecycle_event(LifecycleEvent::Stopped));

        assert!(controller.on_lifecycle_event(LifecycleEvent::Resumed));
        assert!(!controller.is_background_active());
        assert!(!controller.client.is_in_background());
    }

    #[tokio::test]
    async fn test_duplicate_resume_is_noop() {
        let controller = controller();
        assert!(!controller.on_lifecycle_event(LifecycleEvent::Resumed));
        assert_eq!(controller.current_state(), LifecycleEvent::Resumed);
    }

    #[tokio::test]
    async fn test_custom_tab_takes_precedence() {
        let controller = controller();
        assert!(controller.set_custom_tab_open(true));
        assert!(controller.is_background_active());

        // app backgrounds on its own while the tab is open
        assert!(!controller.on_lifecycle_event(LifecycleEvent::Hidden));
        // closing the tab keeps background mode: app is still hidden
        assert!(!controller.set_custom_tab_open(false));
        assert!(controller.is_background_active());

        assert!(controller.on_lifecycle_event(LifecycleEvent::Resumed));
        assert!(!controller.is_background_active());
    }

    #[tokio::test]
    async fn test_resume_with_tab_open_stays_background() {
        let controller = controller();
        controller.on_lifecycle_event(LifecycleEvent::Paused);
        controller.set_custom_tab_open(true);
        assert!(!controller.on_lifecycle_event(LifecycleEvent::Resumed));
        assert!(controller.is_background_active());
        assert!(controller.set_custom_tab_open(false));
        assert!(!controller.is_background_active());
    }
}
