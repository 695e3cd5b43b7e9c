//! Control channel for code outside the shell.
//!
//! Menus, buttons and the idle monitor need to trigger a sign-out or reset
//! the idle timer without holding a reference to the shell. They publish a
//! [`ControlMessage`] through a [`ControlHandle`]; the shell drains its
//! subscription on its next pass.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use utoipa::ToSchema;

/// Messages understood by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    /// End the session.
    SignOut,
    /// Treat as user activity.
    ResetIdle,
    /// Re-read the profile from the auth backend.
    RefreshProfile,
}

/// Default buffered messages per subscriber.
pub const DEFAULT_CONTROL_CAPACITY: usize = 32;

/// Owner of the control channel.
#[derive(Debug, Clone)]
pub struct ControlBus {
    sender: broadcast::Sender<ControlMessage>,
}

impl Default for ControlBus {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_CAPACITY)
    }
}

impl ControlBus {
    /// Creates a bus buffering `capacity` messages per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A publishing handle.
    #[must_use]
    pub fn handle(&self) -> ControlHandle {
        ControlHandle {
            sender: self.sender.clone(),
        }
    }

    /// A new subscription, seeing messages published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControlMessage> {
        self.sender.subscribe()
    }
}

/// Cloneable publisher for [`ControlMessage`]s.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: broadcast::Sender<ControlMessage>,
}

impl ControlHandle {
    /// Publishes a message. Returns `false` if nobody is listening.
    pub fn publish(&self, message: ControlMessage) -> bool {
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(?message, receivers, "Control message published");
                true
            }
            Err(_) => {
                debug!(?message, "Control message dropped, no subscribers");
                false
            }
        }
    }

    /// Requests a sign-out.
    pub fn sign_out(&self) -> bool {
        self.publish(ControlMessage::SignOut)
    }

    /// Requests an idle reset.
    pub fn reset_idle(&self) -> bool {
        self.publish(ControlMessage::ResetIdle)
    }

    /// Requests a profile refresh.
    pub fn refresh_profile(&self) -> bool {
        self.publish(ControlMessage::RefreshProfile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = ControlBus::default();
        assert!(!bus.handle().sign_out());
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let bus = ControlBus::new(4);
        let mut rx = bus.subscribe();
        let handle = bus.handle();

        assert!(handle.reset_idle());
        assert!(handle.sign_out());

        assert_eq!(rx.try_recv().unwrap(), ControlMessage::ResetIdle);
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::SignOut);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handles_share_channel() {
        let bus = ControlBus::default();
        let mut rx = bus.subscribe();
        let a = bus.handle();
        let b = a.clone();

        a.refresh_profile();
        b.sign_out();
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::RefreshProfile);
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::SignOut);
    }
}
