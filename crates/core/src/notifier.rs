use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::domain::request::{Request, RequestId, RequestStatus};
use crate::lifecycle::LifecycleEvent;
use crate::realtime::{Envelope, EventBus, Room, RoomRouter};

pub const REQUEST_NEW: &str = "request:new";
pub const REQUEST_APPROVED: &str = "request:approved";
pub const REQUEST_FINALIZED: &str = "request:finalized";
pub const REQUEST_DELETED: &str = "request:deleted";

/// Turns lifecycle events into room publications.
#[derive(Clone)]
pub struct Notifier {
    bus: Arc<EventBus>,
}

impl Notifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Publishes every event and returns the total number of deliveries.
    pub fn publish(&self, events: &[LifecycleEvent]) -> usize {
        events.iter().map(|event| self.publish_one(event)).sum()
    }

    pub fn request_deleted(&self, request_id: &RequestId) -> usize {
        self.bus.broadcast(Envelope::new(REQUEST_DELETED, json!({ "id": request_id })))
    }

    fn publish_one(&self, event: &LifecycleEvent) -> usize {
        match event {
            LifecycleEvent::Submitted { request, approver } => {
                let Some(room) =
                    RoomRouter::approver_room(*approver, &request.branch, &request.section)
                else {
                    return 0;
                };
                self.send(&room, REQUEST_NEW, summary(request, true), &request.id)
            }
            LifecycleEvent::Advanced { request, approver } => {
                let Some(room) =
                    RoomRouter::approver_room(*approver, &request.branch, &request.section)
                else {
                    return 0;
                };
                let name = format!("request:{}", request.status.as_str());
                self.send(&room, &name, summary(request, false), &request.id)
            }
            LifecycleEvent::Approved { request, credential } => {
                let scanner = json!({
                    "request_id": request.id,
                    "credential": credential.secret,
                    "requester_name": request.requester_name,
                    "from": request.window.from.to_rfc3339(),
                    "to": request.window.to.to_rfc3339(),
                });
                let dev = json!({
                    "request_id": request.id,
                    "credential": credential.secret,
                    "requester_name": request.requester_name,
                });
                self.send(&Room::Scanner, REQUEST_APPROVED, scanner, &request.id)
                    + self.send(&Room::Dev, REQUEST_APPROVED, dev, &request.id)
            }
            LifecycleEvent::Finalized { request_id, status } => self.finalized(request_id, *status),
        }
    }

    fn finalized(&self, request_id: &RequestId, status: RequestStatus) -> usize {
        self.bus.broadcast(Envelope::new(
            REQUEST_FINALIZED,
            json!({ "id": request_id, "status": status }),
        ))
    }

    fn send(&self, room: &Room, event: &str, data: Value, request_id: &RequestId) -> usize {
        let delivered = self.bus.publish(room, Envelope::new(event, data));
        debug!(
            event_name = "realtime.publish",
            event,
            room = %room,
            request_id = %request_id,
            delivered,
            "event published"
        );
        delivered
    }
}

fn summary(request: &Request, with_window: bool) -> Value {
    let mut value = json!({
        "id": request.id,
        "requester_name": request.requester_name,
        "reason": request.reason,
    });
    if with_window {
        value["from"] = json!(request.window.from.to_rfc3339());
        value["to"] = json!(request.window.to.to_rfc3339());
    }
    value
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::Notifier;
    use crate::audit::InMemoryAuditLog;
    use crate::domain::principal::{Principal, Role};
    use crate::domain::request::NewRequest;
    use crate::lifecycle::{LifecycleEngine, LifecycleSettings};
    use crate::realtime::{EventBus, RoomRouter};
    use crate::store::InMemoryStore;
    use crate::token::TokenService;

    fn principal(id: &str, role: Role) -> Principal {
        Principal::new(id, id, role).with_branch("CSE").with_section("A")
    }

    #[tokio::test]
    async fn scenario_routes_each_event_to_its_rooms() {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store.clone(), 3600);
        let engine = LifecycleEngine::new(
            store,
            tokens.clone(),
            Arc::new(InMemoryAuditLog::default()),
            LifecycleSettings::default(),
        );
        let bus = EventBus::new(16);
        let notifier = Notifier::new(bus.clone());

        let mentor = principal("men-1", Role::Mentor);
        let other_mentor = Principal::new("men-9", "x", Role::Mentor)
            .with_branch("CSE")
            .with_section("B");
        let hod = principal("hod-1", Role::Hod);
        let watchman = Principal::new("w-1", "gate", Role::Watchman);
        let dev = Principal::new("d-1", "ops", Role::Dev);

        let mut mentor_rx = bus.subscribe(RoomRouter::rooms_for(&mentor));
        let mut other_rx = bus.subscribe(RoomRouter::rooms_for(&other_mentor));
        let mut hod_rx = bus.subscribe(RoomRouter::rooms_for(&hod));
        let mut scanner_rx = bus.subscribe(RoomRouter::rooms_for(&watchman));
        let mut dev_rx = bus.subscribe(RoomRouter::rooms_for(&dev));

        let now = Utc::now();
        let created = engine
            .submit(
                &principal("stu-1", Role::Student),
                NewRequest {
                    reason: "medical".to_string(),
                    from: now,
                    to: now + Duration::days(1),
                    branch: None,
                    section: None,
                },
            )
            .await
            .expect("submit");
        notifier.publish(&created.events);

        let new = mentor_rx.recv().await.expect("mentor notified");
        assert_eq!(new.event, "request:new");
        assert_eq!(new.data["reason"], "medical");
        assert!(new.data.get("from").is_some());
        assert!(other_rx.try_recv().is_none(), "other section must not hear it");
        assert!(hod_rx.try_recv().is_none());

        let id = created.request.id;
        let advanced = engine.approve(&mentor, &id, None).await.expect("mentor approves");
        notifier.publish(&advanced.events);
        let handed_over = hod_rx.recv().await.expect("hod notified");
        assert_eq!(handed_over.event, "request:mentors_approved");
        assert!(handed_over.data.get("from").is_none());

        let approved = engine.approve(&hod, &id, None).await.expect("hod approves");
        notifier.publish(&approved.events);

        let scanned = scanner_rx.recv().await.expect("scanner notified");
        assert_eq!(scanned.event, "request:approved");
        let secret = scanned.data["credential"].as_str().expect("secret").to_string();
        assert!(tokens.verify(&secret).await.expect("verify").is_valid());
        assert!(scanned.data.get("from").is_some());

        let dev_event = dev_rx.recv().await.expect("dev notified");
        assert_eq!(dev_event.event, "request:approved");
        assert!(dev_event.data.get("from").is_none());

        let finalized = dev_rx.recv().await.expect("finalized broadcast");
        assert_eq!(finalized.event, "request:finalized");
        assert_eq!(finalized.data["status"], "approved");
    }

    #[tokio::test]
    async fn deleted_is_broadcast_to_everyone() {
        let bus = EventBus::new(4);
        let notifier = Notifier::new(bus.clone());
        let mut student = bus.subscribe(Vec::new());

        let delivered =
            notifier.request_deleted(&crate::domain::request::RequestId("req-1".to_string()));

        assert_eq!(delivered, 1);
        let envelope = student.recv().await.expect("broadcast");
        assert_eq!(envelope.data["id"], "req-1");
    }
}
