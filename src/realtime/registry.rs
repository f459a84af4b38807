use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::auth::claims::Role;

/// Reserved broadcast group; joinable only by admin sessions.
pub const ADMIN_GROUP: &str = "admin";

/// Personal broadcast group for a user.
pub fn user_group(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// One live realtime connection. Ephemeral; never persisted.
struct Session {
    user_id: Uuid,
    role: Role,
    groups: HashSet<String>,
    tx: UnboundedSender<String>,
}

/// Read-only view of a session taken under the registry lock. Broadcasts
/// operate on these so the registry can change between sends without
/// skipping or double-sending anyone.
#[derive(Clone)]
pub struct SessionSnapshot {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub groups: HashSet<String>,
    pub tx: UnboundedSender<String>,
}

/// Registry of live connections, keyed by connection id.
///
/// Explicitly owned by `AppState` and injected where needed; mutated only by
/// the connect/disconnect/join handlers and read by broadcasts via
/// [`ConnectionRegistry::snapshot`].
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection. The session auto-joins its
    /// personal group, plus the admin group when the role allows it.
    pub fn register(&self, user_id: Uuid, role: Role, tx: UnboundedSender<String>) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut groups = HashSet::new();
        groups.insert(user_group(user_id));
        match role {
            Role::Admin => {
                groups.insert(ADMIN_GROUP.to_string());
            }
            Role::User => {}
        }
        let session = Session {
            user_id,
            role,
            groups,
            tx,
        };
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(connection_id, session);
        connection_id
    }

    pub fn remove(&self, connection_id: Uuid) {
        self.sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&connection_id);
    }

    /// Add the connection to a named group. Authorization happens at the
    /// message handler; the registry only records membership.
    pub fn join_group(&self, connection_id: Uuid, group: &str) -> bool {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match sessions.get_mut(&connection_id) {
            Some(session) => {
                session.groups.insert(group.to_string());
                true
            }
            None => false,
        }
    }

    /// Snapshot of every live session; the lock is released before the caller
    /// starts sending.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(id, s)| SessionSnapshot {
                connection_id: *id,
                user_id: s.user_id,
                role: s.role,
                groups: s.groups.clone(),
                tx: s.tx.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn register_auto_joins_personal_group() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let user_id = Uuid::new_v4();
        let conn = registry.register(user_id, Role::User, tx);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        let session = &snapshot[0];
        assert_eq!(session.connection_id, conn);
        assert!(session.groups.contains(&user_group(user_id)));
        assert!(!session.groups.contains(ADMIN_GROUP));
    }

    #[test]
    fn admin_auto_joins_admin_group() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), Role::Admin, tx);
        assert!(registry.snapshot()[0].groups.contains(ADMIN_GROUP));
    }

    #[test]
    fn remove_drops_session() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = registry.register(Uuid::new_v4(), Role::User, tx);
        assert_eq!(registry.len(), 1);
        registry.remove(conn);
        assert!(registry.is_empty());
    }

    #[test]
    fn join_group_records_membership() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = registry.register(Uuid::new_v4(), Role::User, tx);
        assert!(registry.join_group(conn, "reports"));
        assert!(registry.snapshot()[0].groups.contains("reports"));
    }

    #[test]
    fn join_group_on_unknown_connection_is_refused() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.join_group(Uuid::new_v4(), "reports"));
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = registry.register(Uuid::new_v4(), Role::User, tx);
        let snapshot = registry.snapshot();
        registry.remove(conn);
        // The snapshot taken before the disconnect still holds the session.
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}
