use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::Frame;

/// Delivery handler for MESSAGE frames of one subscription.
pub type MessageCallback = Box<dyn FnMut(&Frame) + Send + 'static>;

/// Mints subscription ids `sub-0`, `sub-1`, ... for one connection.
///
/// Ids are never reused, even after the subscription is removed.
#[derive(Debug, Default)]
pub struct SubscriptionIds {
    counter: AtomicU64,
}

impl SubscriptionIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        format!("sub-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// A registered subscription: id, destination and optional callback.
pub struct Subscription {
    id: String,
    destination: String,
    callback: Option<MessageCallback>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        callback: Option<MessageCallback>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            callback,
        }
    }

    /// Returns the local subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the destination this subscription listens to.
    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Subscription dispatch table: subscription id -> subscription.
///
/// Owned by the session task; only `insert` and `remove` change membership.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, replacing any entry with the same id.
    pub fn insert(&mut self, subscription: Subscription) {
        self.entries.insert(subscription.id.clone(), subscription);
    }

    /// Remove a subscription by id, returning it if it was registered.
    pub fn remove(&mut self, id: &str) -> Option<Subscription> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand a MESSAGE frame to the callback named by its `subscription`
    /// header.
    ///
    /// Returns `true` if a registered subscription matched. Frames without the
    /// header or for unknown ids are dropped and return `false`.
    pub fn dispatch(&mut self, frame: &Frame) -> bool {
        let Some(id) = frame.get_header("subscription") else {
            return false;
        };
        match self.entries.get_mut(id) {
            Some(subscription) => {
                if let Some(callback) = subscription.callback.as_mut() {
                    callback(frame);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscription_without_callback_still_matches() {
        let mut reg = SubscriptionRegistry::new();
        reg.insert(Subscription::new("sub-0", "/queue/a", None));
        let msg = Frame::new("MESSAGE").header("subscription", "sub-0");
        assert!(reg.dispatch(&msg));
    }

    #[test]
    fn dispatch_leaves_membership_alone() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut reg = SubscriptionRegistry::new();
        reg.insert(Subscription::new(
            "sub-3",
            "/topic/t",
            Some(Box::new(move |_f: &Frame| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        ));
        let msg = Frame::new("MESSAGE").header("subscription", "sub-3");
        assert!(reg.dispatch(&msg));
        assert!(reg.dispatch(&msg));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(reg.len(), 1);
    }
}
