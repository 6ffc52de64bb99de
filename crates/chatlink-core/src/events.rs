//! Domain event bus for contact changes
//!
//! Subscribers each get their own unbounded queue, so every event reaches
//! every live subscriber exactly in the order it was published, and a slow
//! subscriber never blocks the publisher. Dropping a [`Subscription`] (or
//! calling [`EventBus::unsubscribe`]) releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{FriendInfo, GroupId, MemberInfo, Uin};

// ----------------------------------------------------------------------------
// Contact Events
// ----------------------------------------------------------------------------

/// Change notifications for contacts mirrored in the local caches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactEvent {
    /// A friend was added or their profile changed
    FriendInfoChanged(FriendInfo),
    /// A friend was deleted
    FriendRemoved { uin: Uin },
    /// A group member joined or their profile changed
    GroupMemberChanged { group_id: GroupId, member: MemberInfo },
    /// A member left or was removed from a group
    GroupMemberRemoved { group_id: GroupId, uin: Uin },
    /// A full member list was fetched from the server
    GroupMembersRefreshed {
        group_id: GroupId,
        members: Vec<MemberInfo>,
        member_seq: i64,
    },
}

impl ContactEvent {
    /// The group this event concerns, if any
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            ContactEvent::GroupMemberChanged { group_id, .. }
            | ContactEvent::GroupMemberRemoved { group_id, .. }
            | ContactEvent::GroupMembersRefreshed { group_id, .. } => Some(*group_id),
            ContactEvent::FriendInfoChanged(_) | ContactEvent::FriendRemoved { .. } => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Event Bus
// ----------------------------------------------------------------------------

/// Identifier of one subscription on an [`EventBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<ContactEvent>>>,
}

impl BusInner {
    fn subscribers(
        &self,
    ) -> MutexGuard<'_, HashMap<SubscriptionId, mpsc::UnboundedSender<ContactEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Publish/subscribe hub for [`ContactEvent`]s
///
/// Cloning the bus yields another handle to the same subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.subscribers().insert(id, sender);
        trace!("Event subscription {:?} registered", id);

        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Release a subscriber; pending events stay readable until drained
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers().remove(&id).is_some()
    }

    /// Deliver an event to every subscriber, returning how many received it
    pub fn publish(&self, event: ContactEvent) -> usize {
        let mut subscribers = self.inner.subscribers();
        // Receivers that went away without unsubscribing are pruned here
        subscribers.retain(|_, sender| sender.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

// ----------------------------------------------------------------------------
// Subscription
// ----------------------------------------------------------------------------

/// Receiving end of one subscription; unsubscribes on drop
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<ContactEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<ContactEvent> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ContactEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers().remove(&self.id);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
