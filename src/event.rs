//! Event bus carrying door transitions and lifecycle requests between
//! services.

use std::fmt;

use anyhow::Result;
use tokio::sync::broadcast;

use crate::slots::DoorState;

/// Which override button fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    CloseAll,
    OpenAll,
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseAll => f.write_str("close-all"),
            Self::OpenAll => f.write_str("open-all"),
        }
    }
}

/// Application events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A slot's actuator was driven to a new state by the reconciler.
    DoorChanged {
        medication: String,
        state: DoorState,
    },
    /// A door was opened for dispensing.
    Dispensed(String),
    /// An override button finished its sweep.
    OverrideApplied {
        action: OverrideAction,
        affected: usize,
    },
    SystemShutdown,
}

/// Broadcast bus shared by every service.
///
/// # Example
///
/// ```no_run
/// use medimated::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
/// event_bus.publish(Event::Dispensed("Aspirin".into())).unwrap();
/// // In async context: subscriber.recv().await
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Publishes an event nobody may be listening to.
    pub fn notify(&self, event: Event) {
        if let Err(e) = self.publish(event) {
            log::debug!("Event dropped: {e}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::RecvError;
    use tokio::time::{Duration, sleep};
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn clones_share_one_channel() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _r1 = bus1.subscribe();
        let _r2 = bus2.subscribe();

        assert_eq!(bus1.sender.receiver_count(), 2);
    }

    #[tokio::test]
    async fn door_change_reaches_every_subscriber() {
        let bus = EventBus::new();
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();

        let event = Event::DoorChanged {
            medication: "Aspirin".to_string(),
            state: DoorState::Open,
        };
        bus.publish(event.clone()).unwrap();

        assert_eq!(r1.recv().await.unwrap(), event);
        assert_eq!(r2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_fails_but_notify_does_not_panic() {
        let bus = EventBus::new();

        assert_err!(bus.publish(Event::SystemShutdown));
        bus.notify(Event::SystemShutdown);

        let _rx = bus.subscribe();
        assert_ok!(bus.publish(Event::SystemShutdown));
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::Dispensed("Vitamin".to_string())).unwrap();
        bus.publish(Event::OverrideApplied {
            action: OverrideAction::CloseAll,
            affected: 1,
        })
        .unwrap();
        bus.publish(Event::SystemShutdown).unwrap();

        assert_eq!(rx.recv().await.unwrap(), Event::Dispensed("Vitamin".to_string()));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::OverrideApplied {
                action: OverrideAction::CloseAll,
                affected: 1
            }
        ));
        assert_eq!(rx.recv().await.unwrap(), Event::SystemShutdown);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        let _early = bus.subscribe();
        bus.publish(Event::Dispensed("Aspirin".to_string())).unwrap();

        let mut late = bus.subscribe();
        bus.publish(Event::SystemShutdown).unwrap();

        assert_eq!(late.recv().await.unwrap(), Event::SystemShutdown);
    }

    #[tokio::test]
    async fn works_across_tasks() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let publisher = bus.clone();

        let handle = tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            publisher.publish(Event::SystemShutdown).unwrap();
        });

        assert_eq!(rx.recv().await.unwrap(), Event::SystemShutdown);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::with_capacity(4);
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.publish(Event::Dispensed(format!("med{i}"))).unwrap();
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(6))));
        assert_eq!(rx.recv().await.unwrap(), Event::Dispensed("med6".to_string()));
    }

    #[test]
    fn override_action_names() {
        assert_eq!(OverrideAction::CloseAll.to_string(), "close-all");
        assert_eq!(OverrideAction::OpenAll.to_string(), "open-all");
    }
}
