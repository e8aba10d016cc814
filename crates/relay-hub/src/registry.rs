use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::message::{ConnectionId, Message};

/// One live connection as the hub sees it: the flag it registered under, the
/// sending end of its bounded outbound queue, and the kick signal whose drop
/// tells the session to force the transport shut.
pub(crate) struct RegisteredClient {
    pub flag: String,
    pub tx: mpsc::Sender<Arc<Message>>,
    pub kick: watch::Sender<bool>,
}

/// Membership state. Owned exclusively by the hub's dispatch loop, so none of
/// this needs locking.
///
/// Invariants: every id in the flag index exists in `clients`; a client with
/// a non-empty flag appears under exactly that flag; empty flags are never
/// indexed.
#[derive(Default)]
pub(crate) struct Registry {
    clients: HashMap<ConnectionId, RegisteredClient>,
    flags: HashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    /// Add a connection. Re-inserting an existing id first unlinks the old
    /// entry so the flag index never holds a stale membership.
    pub fn insert(
        &mut self,
        id: ConnectionId,
        flag: String,
        tx: mpsc::Sender<Arc<Message>>,
        kick: watch::Sender<bool>,
    ) {
        if self.clients.contains_key(&id) {
            self.remove(id);
        }
        if !flag.is_empty() {
            self.flags.entry(flag.clone()).or_default().insert(id);
        }
        self.clients.insert(id, RegisteredClient { flag, tx, kick });
    }

    /// Remove a connection, dropping its queue sender and kick signal.
    /// Absent ids are a no-op (returns false), which makes unregistration
    /// idempotent under concurrent triggers.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(client) = self.clients.remove(&id) else {
            return false;
        };
        if !client.flag.is_empty() {
            if let Some(members) = self.flags.get_mut(&client.flag) {
                members.remove(&id);
                if members.is_empty() {
                    self.flags.remove(&client.flag);
                }
            }
        }
        true
    }

    /// Resolve the target set for a broadcast: everyone for the empty flag,
    /// else the members of that flag (empty when nobody holds it).
    pub fn targets(&self, flag: &str) -> Vec<ConnectionId> {
        if flag.is_empty() {
            self.clients.keys().copied().collect()
        } else {
            self.flags
                .get(flag)
                .map(|members| members.iter().copied().collect())
                .unwrap_or_default()
        }
    }

    pub fn sender(&self, id: ConnectionId) -> Option<&mpsc::Sender<Arc<Message>>> {
        self.clients.get(&id).map(|c| &c.tx)
    }

    /// Drop every entry. Dropping the senders closes each connection's
    /// outbound queue and fires each kick signal, which is how sessions
    /// learn to tear their transport down.
    pub fn clear(&mut self) {
        self.clients.clear();
        self.flags.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> mpsc::Sender<Arc<Message>> {
        mpsc::channel(1).0
    }

    fn kick() -> watch::Sender<bool> {
        watch::channel(false).0
    }

    #[test]
    fn flagged_insert_is_indexed() {
        let mut reg = Registry::default();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        reg.insert(a, "usertest".into(), queue(), kick());
        reg.insert(b, String::new(), queue(), kick());

        assert_eq!(reg.targets("usertest"), vec![a]);
        assert_eq!(reg.targets("").len(), 2);
        // empty flags are never indexed as a group
        assert!(reg.targets("ghost").is_empty());
    }

    #[test]
    fn remove_is_idempotent_and_prunes_the_index() {
        let mut reg = Registry::default();
        let a = ConnectionId::new();
        reg.insert(a, "usertest".into(), queue(), kick());

        assert!(reg.remove(a));
        assert!(!reg.remove(a));
        assert!(reg.targets("usertest").is_empty());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn remove_fires_the_kick_signal() {
        let mut reg = Registry::default();
        let a = ConnectionId::new();
        let (kick_tx, kick_rx) = watch::channel(false);
        reg.insert(a, String::new(), queue(), kick_tx);

        assert!(kick_rx.has_changed().is_ok());
        reg.remove(a);
        // sender dropped with the entry: the session sees the kick
        assert!(kick_rx.has_changed().is_err());
    }

    #[test]
    fn reinsert_moves_the_flag_membership() {
        let mut reg = Registry::default();
        let a = ConnectionId::new();
        reg.insert(a, "old".into(), queue(), kick());
        reg.insert(a, "new".into(), queue(), kick());

        assert!(reg.targets("old").is_empty());
        assert_eq!(reg.targets("new"), vec![a]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn clear_empties_everything() {
        let mut reg = Registry::default();
        reg.insert(ConnectionId::new(), "usertest".into(), queue(), kick());
        reg.insert(ConnectionId::new(), String::new(), queue(), kick());
        reg.clear();
        assert_eq!(reg.len(), 0);
        assert!(reg.targets("usertest").is_empty());
    }
}
