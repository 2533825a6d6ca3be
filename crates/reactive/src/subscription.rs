//! Subscription management for live queries.
//!
//! This module provides subscription IDs and a manager for tracking
//! active subscriptions to a live query.

use crate::change_set::ChangeSet;
use hashbrown::HashMap;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type ChangeCallback = Box<dyn Fn(&ChangeSet) + Send>;

/// A subscription to result changes.
pub struct Subscription {
    id: SubscriptionId,
    callback: ChangeCallback,
    active: bool,
}

impl Subscription {
    /// Creates a new subscription.
    pub fn new<F>(id: SubscriptionId, callback: F) -> Self
    where
        F: Fn(&ChangeSet) + Send + 'static,
    {
        Self {
            id,
            callback: Box::new(callback),
            active: true,
        }
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stops delivering notifications without unregistering.
    #[inline]
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Notifies this subscription of changes.
    pub fn notify(&self, changes: &ChangeSet) {
        if self.active {
            (self.callback)(changes);
        }
    }
}

/// Manages subscriptions for a live query.
pub struct SubscriptionManager {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    next_id: SubscriptionId,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Subscribes to changes with the given callback.
    ///
    /// Returns the subscription ID that can be used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeSet) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Subscription::new(id, callback));
        id
    }

    /// Unsubscribes by ID. Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Deactivates a subscription, keeping its ID reserved.
    pub fn pause(&mut self, id: SubscriptionId) -> bool {
        match self.subscriptions.get_mut(&id) {
            Some(sub) => {
                sub.deactivate();
                true
            }
            None => false,
        }
    }

    /// Notifies all active subscriptions of changes.
    pub fn notify_all(&self, changes: &ChangeSet) {
        for sub in self.subscriptions.values() {
            sub.notify(changes);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
