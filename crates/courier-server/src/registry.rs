//! Connection registry: identity → group of live connections.
//!
//! Three `DashMap`s back the registry:
//! - `connections`: every attached connection, registered or not
//! - `groups`: identity → members, keyed by connection ID
//! - `memberships`: reverse index, connection → the identity it joined
//!
//! A group is only ever mutated under its own shard lock, so `join`, `leave`
//! and `resolve` on one identity never see a half-updated member set. No
//! method holds a guard on one map while touching another.

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::{ConnectionId, Identity};
use dashmap::DashMap;

use crate::websocket::connection::ClientConnection;

type Group = HashMap<ConnectionId, Arc<ClientConnection>>;

/// Maps identities to the live connections currently registered under them.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    groups: DashMap<Identity, Group>,
    memberships: DashMap<ConnectionId, Identity>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted connection.
    pub fn attach(&self, connection: Arc<ClientConnection>) {
        let _ = self.connections.insert(connection.id.clone(), connection);
    }

    /// Forget a closed connection, leaving its group first.
    pub fn detach(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let _ = self.leave(id);
        self.connections.remove(id).map(|(_, conn)| conn)
    }

    /// Add `connection` to `identity`'s group, creating the group if needed.
    ///
    /// Idempotent. A connection belongs to at most one group: joining a new
    /// identity moves it out of the previous one.
    pub fn join(&self, identity: &Identity, connection: &Arc<ClientConnection>) {
        let previous = self.memberships.insert(connection.id.clone(), identity.clone());
        if let Some(previous) = previous.filter(|p| p != identity) {
            self.remove_member(&previous, &connection.id);
        }
        let _ = self
            .groups
            .entry(identity.clone())
            .or_default()
            .insert(connection.id.clone(), Arc::clone(connection));
    }

    /// Remove a connection from whatever group it joined.
    ///
    /// Returns the identity it left, or `None` if it never registered.
    pub fn leave(&self, id: &ConnectionId) -> Option<Identity> {
        let (_, identity) = self.memberships.remove(id)?;
        self.remove_member(&identity, id);
        Some(identity)
    }

    /// Live members of `identity`'s group. Empty when nobody is registered.
    pub fn resolve(&self, identity: &Identity) -> Vec<Arc<ClientConnection>> {
        self.groups
            .get(identity)
            .map(|group| group.values().filter(|c| !c.is_closed()).cloned().collect())
            .unwrap_or_default()
    }

    /// Look up an attached connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Identity a connection is currently registered under.
    pub fn identity_of(&self, id: &ConnectionId) -> Option<Identity> {
        self.memberships.get(id).map(|i| i.value().clone())
    }

    /// Number of attached connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of identities with at least one member.
    pub fn identity_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of members in `identity`'s group.
    pub fn group_size(&self, identity: &Identity) -> usize {
        self.groups.get(identity).map_or(0, |g| g.len())
    }

    fn remove_member(&self, identity: &Identity, id: &ConnectionId) {
        if let Some(mut group) = self.groups.get_mut(identity) {
            let _ = group.remove(id);
        }
        let _ = self.groups.remove_if(identity, |_, group| group.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(ClientConnection::new(ConnectionId::from_raw(id), tx)), rx)
    }

    fn ids(conns: &[Arc<ClientConnection>]) -> Vec<&str> {
        let mut ids: Vec<&str> = conns.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn resolve_unknown_identity_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.resolve(&Identity::from("nobody")).is_empty());
        assert_eq!(registry.group_size(&Identity::from("nobody")), 0);
    }

    #[test]
    fn join_creates_group() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        let alice = Identity::from("alice");

        registry.join(&alice, &c1);

        assert_eq!(ids(&registry.resolve(&alice)), vec!["c1"]);
        assert_eq!(registry.identity_of(&c1.id), Some(alice));
        assert_eq!(registry.identity_count(), 1);
    }

    #[test]
    fn join_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        let u1 = Identity::from("u1");

        registry.join(&u1, &c1);
        registry.join(&u1, &c1);

        assert_eq!(registry.group_size(&u1), 1);
    }

    #[test]
    fn group_holds_multiple_connections() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let alice = Identity::from("alice");

        registry.join(&alice, &c1);
        registry.join(&alice, &c2);

        assert_eq!(ids(&registry.resolve(&alice)), vec!["c1", "c2"]);
    }

    #[test]
    fn rejoin_moves_membership() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        let alice = Identity::from("alice");
        let alicia = Identity::from("alicia");

        registry.join(&alice, &c1);
        registry.join(&alicia, &c1);

        assert!(registry.resolve(&alice).is_empty());
        assert_eq!(ids(&registry.resolve(&alicia)), vec!["c1"]);
        assert_eq!(registry.identity_count(), 1, "empty group should be removed");
    }

    #[test]
    fn rejoin_keeps_other_members() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let alice = Identity::from("alice");

        registry.join(&alice, &c1);
        registry.join(&alice, &c2);
        registry.join(&Identity::from("bob"), &c1);

        assert_eq!(ids(&registry.resolve(&alice)), vec!["c2"]);
    }

    #[test]
    fn leave_removes_membership() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        let alice = Identity::from("alice");

        registry.join(&alice, &c1);
        assert_eq!(registry.leave(&c1.id), Some(alice.clone()));

        assert!(registry.resolve(&alice).is_empty());
        assert_eq!(registry.identity_count(), 0);
        assert!(registry.identity_of(&c1.id).is_none());
    }

    #[test]
    fn leave_unregistered_is_noop() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        registry.attach(Arc::clone(&c1));

        assert_eq!(registry.leave(&c1.id), None);
        assert_eq!(registry.leave(&c1.id), None);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn attach_and_detach() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let bob = Identity::from("bob");

        registry.attach(Arc::clone(&c1));
        registry.attach(Arc::clone(&c2));
        registry.join(&bob, &c1);
        assert_eq!(registry.connection_count(), 2);
        assert!(registry.get(&c1.id).is_some());

        let detached = registry.detach(&c1.id).unwrap();
        assert_eq!(detached.id, c1.id);
        assert_eq!(registry.connection_count(), 1);
        assert!(registry.get(&c1.id).is_none());
        assert!(registry.resolve(&bob).is_empty());

        assert!(registry.detach(&c1.id).is_none());
    }

    #[test]
    fn resolve_skips_closed_connections() {
        let registry = ConnectionRegistry::new();
        let (c1, rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let alice = Identity::from("alice");

        registry.join(&alice, &c1);
        registry.join(&alice, &c2);
        drop(rx1);

        assert_eq!(ids(&registry.resolve(&alice)), vec!["c2"]);
    }

    #[test]
    fn empty_identity_is_a_valid_group() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx) = make_connection("c1");
        let empty = Identity::from("");

        registry.join(&empty, &c1);
        assert_eq!(registry.group_size(&empty), 1);
    }

    #[test]
    fn concurrent_join_leave_on_one_identity() {
        let registry = Arc::new(ConnectionRegistry::new());
        let shared = Identity::from("shared");
        let mut keep = Vec::new();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let (conn, rx) = make_connection(&format!("c{t}"));
                keep.push(rx);
                let registry = Arc::clone(&registry);
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        registry.join(&shared, &conn);
                        let _ = registry.resolve(&shared);
                        if i % 2 == 0 {
                            let _ = registry.leave(&conn.id);
                        }
                    }
                    registry.join(&shared, &conn);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.group_size(&shared), 8);
    }
}
