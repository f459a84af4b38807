use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::payments::repo::Payment;
use crate::realtime::events::ServerEvent;
use crate::realtime::registry::{user_group, ConnectionRegistry, ADMIN_GROUP};

/// Fans payment events out to the owner's personal group and the admin group,
/// and stats invalidations to everyone.
///
/// All sends go through per-connection unbounded channels, so emitting never
/// blocks the mutating request; a dead or slow client is skipped with a log
/// line and cannot hold up the rest of the fan-out.
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn payment_created(&self, payment: &Payment) {
        debug!(payment_id = %payment.id, "emitting paymentCreated");
        self.broadcast_to_groups(
            &[user_group(payment.user_id), ADMIN_GROUP.to_string()],
            &ServerEvent::PaymentCreated(payment.clone()),
        );
    }

    pub fn payment_updated(&self, payment: &Payment) {
        debug!(payment_id = %payment.id, "emitting paymentUpdated");
        self.broadcast_to_groups(
            &[user_group(payment.user_id), ADMIN_GROUP.to_string()],
            &ServerEvent::PaymentUpdated(payment.clone()),
        );
    }

    pub fn payment_deleted(&self, payment_id: Uuid, owner_id: Uuid) {
        debug!(%payment_id, "emitting paymentDeleted");
        self.broadcast_to_groups(
            &[user_group(owner_id), ADMIN_GROUP.to_string()],
            &ServerEvent::PaymentDeleted { payment_id },
        );
    }

    /// Stats are not owner-scoped at the transport level: every session gets
    /// the cue and re-fetches, with scoping applied at the REST boundary.
    pub fn stats_updated(&self) {
        debug!("emitting statsUpdated");
        self.broadcast_all(&ServerEvent::StatsUpdated);
    }

    /// One send per connection, even when a session is a member of more than
    /// one target group.
    fn broadcast_to_groups(&self, groups: &[String], event: &ServerEvent) {
        let Some(text) = event.encode() else {
            return;
        };
        for session in self.registry.snapshot() {
            if groups.iter().any(|g| session.groups.contains(g)) {
                if session.tx.send(text.clone()).is_err() {
                    warn!(connection_id = %session.connection_id, "dropping event for dead connection");
                }
            }
        }
    }

    fn broadcast_all(&self, event: &ServerEvent) {
        let Some(text) = event.encode() else {
            return;
        };
        for session in self.registry.snapshot() {
            if session.tx.send(text.clone()).is_err() {
                warn!(connection_id = %session.connection_id, "dropping event for dead connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Role;
    use crate::payments::repo::{PaymentMethod, PaymentStatus};
    use rust_decimal::Decimal;
    use time::OffsetDateTime;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn make_payment(owner: Uuid) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            amount: Decimal::new(10000, 2),
            receiver: "John Doe".into(),
            status: PaymentStatus::Pending,
            method: PaymentMethod::Paypal,
            description: None,
            transaction_id: "TXN1700000000000abc123def".into(),
            currency: "INR".into(),
            fee: Decimal::new(290, 2),
            user_id: owner,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn connect(
        registry: &ConnectionRegistry,
        role: Role,
    ) -> (Uuid, Uuid, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let user_id = Uuid::new_v4();
        let conn = registry.register(user_id, role, tx);
        (conn, user_id, rx)
    }

    fn received_events(rx: &mut UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(text) = rx.try_recv() {
            events.push(serde_json::from_str(&text).expect("event should be valid JSON"));
        }
        events
    }

    #[test]
    fn payment_created_reaches_owner_and_admin_but_not_stranger() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let (tx_owner, rx) = mpsc::unbounded_channel();
        let owner_id = Uuid::new_v4();
        registry.register(owner_id, Role::User, tx_owner);
        let mut owner_rx = rx;

        let (_, _, mut admin_rx) = connect(&registry, Role::Admin);
        let (_, _, mut stranger_rx) = connect(&registry, Role::User);

        let payment = make_payment(owner_id);
        notifier.payment_created(&payment);

        let owner_events = received_events(&mut owner_rx);
        let admin_events = received_events(&mut admin_rx);
        let stranger_events = received_events(&mut stranger_rx);

        assert_eq!(owner_events.len(), 1);
        assert_eq!(admin_events.len(), 1);
        assert!(stranger_events.is_empty());

        // Both recipients see the same transaction id.
        assert_eq!(
            owner_events[0]["data"]["transactionId"],
            admin_events[0]["data"]["transactionId"]
        );
        assert_eq!(owner_events[0]["event"], "paymentCreated");
    }

    #[test]
    fn self_admin_owner_receives_exactly_one_event() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(registry.clone());

        // Admin creating their own payment is in both target groups.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let admin_id = Uuid::new_v4();
        registry.register(admin_id, Role::Admin, tx);

        notifier.payment_created(&make_payment(admin_id));
        assert_eq!(received_events(&mut rx).len(), 1);
    }

    #[test]
    fn stats_updated_reaches_every_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let (_, _, mut user_rx) = connect(&registry, Role::User);
        let (_, _, mut admin_rx) = connect(&registry, Role::Admin);

        notifier.stats_updated();

        assert_eq!(received_events(&mut user_rx).len(), 1);
        let admin_events = received_events(&mut admin_rx);
        assert_eq!(admin_events.len(), 1);
        assert_eq!(admin_events[0]["event"], "statsUpdated");
    }

    #[test]
    fn dead_connection_does_not_block_fanout() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), Role::Admin, dead_tx);
        drop(dead_rx);

        let (_, _, mut live_rx) = connect(&registry, Role::Admin);

        notifier.payment_deleted(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(received_events(&mut live_rx).len(), 1);
    }

    #[test]
    fn payment_deleted_targets_owner_group() {
        let registry = Arc::new(ConnectionRegistry::new());
        let notifier = Notifier::new(registry.clone());

        let (tx, mut owner_rx) = mpsc::unbounded_channel();
        let owner_id = Uuid::new_v4();
        registry.register(owner_id, Role::User, tx);
        let (_, _, mut other_rx) = connect(&registry, Role::User);

        let payment_id = Uuid::new_v4();
        notifier.payment_deleted(payment_id, owner_id);

        let events = received_events(&mut owner_rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "paymentDeleted");
        assert_eq!(
            events[0]["data"]["paymentId"],
            payment_id.to_string().as_str()
        );
        assert!(received_events(&mut other_rx).is_empty());
    }
}
