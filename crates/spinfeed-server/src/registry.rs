//! Connection Registry.
//!
//! Owns every live [`ClientConnection`] plus a channel → subscribers
//! index. Mutation is serialized behind one `RwLock`; readers take cloned
//! snapshots so fan-out never holds the lock across a send.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use spinfeed_core::{ChannelId, ConnectionId};

use crate::connection::ClientConnection;
use crate::errors::RegistryError;

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    by_channel: HashMap<ChannelId, HashSet<ConnectionId>>,
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    max_connections: usize,
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Build with a registry-wide connection cap.
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register an admitted connection.
    pub fn register(&self, conn: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.connections.len() >= self.max_connections {
            return Err(RegistryError::CapacityExceeded(format!(
                "registry at {} connections",
                self.max_connections
            )));
        }
        let id = conn.id().clone();
        let _ = inner.connections.insert(id.clone(), conn);
        info!(connection = %id, total = inner.connections.len(), "registered connection");
        Ok(())
    }

    /// Remove a connection and all its channel index entries. Idempotent:
    /// close races between the heartbeat monitor and the transport are
    /// expected.
    pub fn unregister(&self, id: &ConnectionId) {
        let mut inner = self.inner.write();
        let Some(conn) = inner.connections.remove(id) else {
            return;
        };
        for channel in conn.subscriptions() {
            if let Some(subs) = inner.by_channel.get_mut(&channel) {
                let _ = subs.remove(id);
                if subs.is_empty() {
                    let _ = inner.by_channel.remove(&channel);
                }
            }
        }
        info!(connection = %id, total = inner.connections.len(), "unregistered connection");
    }

    /// Subscribe a connection to a channel. Fails over the policy cap;
    /// prior subscriptions stay active.
    pub fn subscribe(
        &self,
        id: &ConnectionId,
        channel: &ChannelId,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let conn = inner
            .connections
            .get(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.to_string()))?
            .clone();

        if conn.is_subscribed(channel) {
            return Ok(());
        }
        let current = conn.subscription_count();
        if !conn.policy().allows_subscription(current) {
            return Err(RegistryError::CapacityExceeded(format!(
                "at {current} of {:?} channels",
                conn.policy().max_visible_channels
            )));
        }

        let _ = conn.add_subscription(channel.clone());
        let _ = inner
            .by_channel
            .entry(channel.clone())
            .or_default()
            .insert(id.clone());
        debug!(connection = %id, channel = %channel, "subscribed");
        Ok(())
    }

    /// Drop a channel subscription. Unsubscribing a channel that was
    /// never subscribed is a no-op.
    pub fn unsubscribe(
        &self,
        id: &ConnectionId,
        channel: &ChannelId,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let conn = inner
            .connections
            .get(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.to_string()))?
            .clone();

        if conn.remove_subscription(channel) {
            if let Some(subs) = inner.by_channel.get_mut(channel) {
                let _ = subs.remove(id);
                if subs.is_empty() {
                    let _ = inner.by_channel.remove(channel);
                }
            }
            debug!(connection = %id, channel = %channel, "unsubscribed");
        }
        Ok(())
    }

    /// Snapshot of a channel's subscribers. Safe to iterate while other
    /// tasks register and unregister.
    #[must_use]
    pub fn channel_subscribers(&self, channel: &ChannelId) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read();
        inner
            .by_channel
            .get(channel)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every live connection, for heartbeat emission.
    #[must_use]
    pub fn all_connections(&self) -> Vec<Arc<ClientConnection>> {
        self.inner.read().connections.values().cloned().collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportKind;
    use assert_matches::assert_matches;
    use spinfeed_core::{Tier, TierTable};
    use tokio::sync::mpsc;

    fn make_conn(tier: Tier) -> Arc<ClientConnection> {
        let (tx, rx) = mpsc::channel(8);
        // Receiver leaked so sends keep succeeding for the test's life.
        std::mem::forget(rx);
        Arc::new(ClientConnection::new(
            ConnectionId::new(),
            None,
            TierTable::default().policy_for(tier),
            TransportKind::WebSocket,
            tx,
        ))
    }

    #[test]
    fn register_then_count() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Basic);
        reg.register(c).unwrap();
        assert_eq!(reg.connection_count(), 1);
    }

    #[test]
    fn registry_cap_is_enforced() {
        let reg = ConnectionRegistry::new(1);
        reg.register(make_conn(Tier::Basic)).unwrap();
        let err = reg.register(make_conn(Tier::Basic)).unwrap_err();
        assert_matches!(err, RegistryError::CapacityExceeded(_));
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Basic);
        let id = c.id().clone();
        reg.register(c).unwrap();
        reg.unregister(&id);
        reg.unregister(&id);
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn basic_tier_third_subscribe_fails_with_first_two_intact() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Basic);
        let id = c.id().clone();
        reg.register(c).unwrap();

        reg.subscribe(&id, &ChannelId::from("r1")).unwrap();
        reg.subscribe(&id, &ChannelId::from("r2")).unwrap();
        let err = reg.subscribe(&id, &ChannelId::from("r3")).unwrap_err();
        assert_matches!(err, RegistryError::CapacityExceeded(_));

        assert_eq!(reg.channel_subscribers(&ChannelId::from("r1")).len(), 1);
        assert_eq!(reg.channel_subscribers(&ChannelId::from("r2")).len(), 1);
        assert!(reg.channel_subscribers(&ChannelId::from("r3")).is_empty());
    }

    #[test]
    fn pro_tier_gets_five_of_ten() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Pro);
        let id = c.id().clone();
        reg.register(c.clone()).unwrap();

        let mut granted = 0;
        for i in 0..10 {
            if reg
                .subscribe(&id, &ChannelId::from(format!("r{i}")))
                .is_ok()
            {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
        assert_eq!(c.subscription_count(), 5);
    }

    #[test]
    fn premium_tier_is_unbounded() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Premium);
        let id = c.id().clone();
        reg.register(c).unwrap();
        for i in 0..100 {
            reg.subscribe(&id, &ChannelId::from(format!("r{i}"))).unwrap();
        }
    }

    #[test]
    fn duplicate_subscribe_does_not_consume_cap() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Basic);
        let id = c.id().clone();
        reg.register(c).unwrap();

        let r1 = ChannelId::from("r1");
        reg.subscribe(&id, &r1).unwrap();
        reg.subscribe(&id, &r1).unwrap();
        reg.subscribe(&id, &ChannelId::from("r2")).unwrap();
        assert_eq!(reg.channel_subscribers(&r1).len(), 1);
    }

    #[test]
    fn unsubscribe_frees_a_slot() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Basic);
        let id = c.id().clone();
        reg.register(c).unwrap();

        reg.subscribe(&id, &ChannelId::from("r1")).unwrap();
        reg.subscribe(&id, &ChannelId::from("r2")).unwrap();
        reg.unsubscribe(&id, &ChannelId::from("r1")).unwrap();
        reg.subscribe(&id, &ChannelId::from("r3")).unwrap();
        assert!(reg.channel_subscribers(&ChannelId::from("r1")).is_empty());
        assert_eq!(reg.channel_subscribers(&ChannelId::from("r3")).len(), 1);
    }

    #[test]
    fn unknown_connection_is_reported() {
        let reg = ConnectionRegistry::new(10);
        let err = reg
            .subscribe(&ConnectionId::new(), &ChannelId::from("r1"))
            .unwrap_err();
        assert_matches!(err, RegistryError::UnknownConnection(_));
    }

    #[test]
    fn unregister_clears_channel_index() {
        let reg = ConnectionRegistry::new(10);
        let c = make_conn(Tier::Pro);
        let id = c.id().clone();
        reg.register(c).unwrap();
        reg.subscribe(&id, &ChannelId::from("r1")).unwrap();
        reg.unregister(&id);
        assert!(reg.channel_subscribers(&ChannelId::from("r1")).is_empty());
    }

    #[test]
    fn subscribers_snapshot_is_stable_across_mutation() {
        let reg = ConnectionRegistry::new(10);
        let a = make_conn(Tier::Pro);
        let b = make_conn(Tier::Pro);
        let (id_a, id_b) = (a.id().clone(), b.id().clone());
        reg.register(a).unwrap();
        reg.register(b).unwrap();
        let r1 = ChannelId::from("r1");
        reg.subscribe(&id_a, &r1).unwrap();
        reg.subscribe(&id_b, &r1).unwrap();

        let snapshot = reg.channel_subscribers(&r1);
        reg.unregister(&id_a);
        // The snapshot still holds both; the registry holds one.
        assert_eq!(snapshot.len(), 2);
        assert_eq!(reg.channel_subscribers(&r1).len(), 1);
    }
}
