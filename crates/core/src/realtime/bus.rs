use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::realtime::rooms::Room;

/// Wire frame pushed to subscribers: `{"event": "...", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }
}

pub type ConnectionId = u64;

struct Subscriber {
    rooms: HashSet<Room>,
    sender: mpsc::Sender<Arc<Envelope>>,
}

/// In-process room fan-out. Delivery is at-most-once to connections that
/// are subscribed at publish time; nothing is buffered for later joiners.
pub struct EventBus {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a connection in `rooms`. Membership ends when the returned
    /// handle is dropped.
    pub fn subscribe(self: &Arc<Self>, rooms: Vec<Room>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        let subscriber = Subscriber { rooms: rooms.into_iter().collect(), sender };

        match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.insert(id, subscriber),
            Err(poisoned) => poisoned.into_inner().insert(id, subscriber),
        };
        debug!(event_name = "realtime.subscribe", connection_id = id, "connection subscribed");

        Subscription { id, bus: Arc::clone(self), receiver }
    }

    /// Returns how many connections accepted the event.
    pub fn publish(&self, room: &Room, envelope: Envelope) -> usize {
        self.deliver(envelope, |subscriber| subscriber.rooms.contains(room))
    }

    /// Delivers to every subscribed connection regardless of room.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        self.deliver(envelope, |_| true)
    }

    pub fn connection_count(&self) -> usize {
        match self.subscribers.read() {
            Ok(subscribers) => subscribers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn deliver(&self, envelope: Envelope, selects: impl Fn(&Subscriber) -> bool) -> usize {
        let envelope = Arc::new(envelope);
        let subscribers = match self.subscribers.read() {
            Ok(subscribers) => subscribers,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut delivered = 0;
        for (id, subscriber) in subscribers.iter().filter(|(_, subscriber)| selects(subscriber)) {
            match subscriber.sender.try_send(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        event_name = "realtime.deliver.dropped",
                        connection_id = *id,
                        event = %envelope.event,
                        "subscriber buffer full; event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    fn unsubscribe(&self, id: ConnectionId) {
        match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        debug!(event_name = "realtime.unsubscribe", connection_id = id, "connection unsubscribed");
    }
}

/// One connection's membership. Dropping it leaves every room.
pub struct Subscription {
    id: ConnectionId,
    bus: Arc<EventBus>,
    receiver: mpsc::Receiver<Arc<Envelope>>,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Envelope, EventBus};
    use crate::realtime::rooms::Room;

    fn mentor_room(section: &str) -> Room {
        Room::Mentor { branch: "CSE".to_string(), section: section.to_string() }
    }

    #[tokio::test]
    async fn publish_reaches_only_members_of_the_room() {
        let bus = EventBus::new(8);
        let mut section_a = bus.subscribe(vec![mentor_room("A")]);
        let mut section_b = bus.subscribe(vec![mentor_room("B")]);

        let delivered = bus.publish(&mentor_room("A"), Envelope::new("request:new", json!({"id": "r1"})));

        assert_eq!(delivered, 1);
        let envelope = section_a.recv().await.expect("delivered");
        assert_eq!(envelope.event, "request:new");
        assert!(section_b.try_recv().is_none());
    }

    #[tokio::test]
    async fn late_joiners_do_not_see_past_events() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(&Room::Scanner, Envelope::new("request:approved", json!({}))), 0);

        let mut scanner = bus.subscribe(vec![Room::Scanner]);
        assert!(scanner.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_leaves_rooms() {
        let bus = EventBus::new(8);
        let subscription = bus.subscribe(vec![Room::Dev]);
        assert_eq!(bus.connection_count(), 1);

        drop(subscription);

        assert_eq!(bus.connection_count(), 0);
        assert_eq!(bus.publish(&Room::Dev, Envelope::new("request:approved", json!({}))), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        let mut slow = bus.subscribe(vec![Room::Dev]);

        assert_eq!(bus.publish(&Room::Dev, Envelope::new("first", json!({}))), 1);
        assert_eq!(bus.publish(&Room::Dev, Envelope::new("second", json!({}))), 0);

        assert_eq!(slow.recv().await.map(|envelope| envelope.event.clone()), Some("first".to_string()));
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let bus = EventBus::new(8);
        let mut student = bus.subscribe(Vec::new());
        let mut dev = bus.subscribe(vec![Room::Dev]);

        assert_eq!(bus.broadcast(Envelope::new("request:deleted", json!({"id": "r1"}))), 2);
        assert!(student.recv().await.is_some());
        assert!(dev.recv().await.is_some());
    }
}
