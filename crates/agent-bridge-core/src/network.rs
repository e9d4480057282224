//! Network reachability signal.

use tokio::sync::watch;

use crate::traits::NetworkMonitor;

/// Reachability flag backed by a watch channel.
///
/// The platform layer calls [`NetworkStatus::set_available`] when its path
/// monitor reports a change; the client observes the transitions.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    sender: watch::Sender<bool>,
}

impl NetworkStatus {
    #[must_use]
    pub fn new(available: bool) -> Self {
        let (sender, _) = watch::channel(available);
        Self { sender }
    }

    /// Publish a reachability change. Repeated values are not re-broadcast.
    pub fn set_available(&self, available: bool) {
        self.sender.send_if_modified(|current| {
            if *current == available {
                false
            } else {
                tracing::debug!(available, "network reachability changed");
                *current = available;
                true
            }
        });
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor for NetworkStatus {
    fn is_available(&self) -> bool {
        *self.sender.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchers_see_changes() {
        let status = NetworkStatus::new(true);
        let mut rx = status.watch();

        status.set_available(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!status.is_available());

        status.set_available(false);
        assert!(!rx.has_changed().unwrap());

        status.set_available(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
