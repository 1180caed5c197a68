//! Client/channel registry.
//!
//! Per channel, an insertion-ordered list of subscriptions; per client id,
//! the active subscription. A subscription record is shared by `Arc`
//! across every channel it joined, so the active map is the single source
//! of truth for a client id.
//!
//! Every mutation completes inside one critical section. The lock is never
//! held across an `.await`: callers take cloned `Arc`s out and deliver
//! afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use switchboard_core::{ActiveClient, BrokerError, Result};

use crate::transport::{Transport, TransportKind};

/// One subscribed client.
pub struct ClientSubscription {
    /// Unique client id.
    pub client_id: String,
    /// Channels joined at subscribe time, in order, without duplicates.
    pub subscribed_channels: Vec<String>,
    /// Opaque data supplied at subscribe time.
    pub data: Value,
    /// How the client is reached.
    pub transport: Arc<dyn Transport>,
}

impl ClientSubscription {
    /// Whether the client lives in this process.
    pub fn is_in_process(&self) -> bool {
        self.transport.kind() == TransportKind::InProcess
    }

    /// The `{clientId, subscribedChannels}` view.
    pub fn active_client(&self) -> ActiveClient {
        ActiveClient {
            client_id: self.client_id.clone(),
            subscribed_channels: self.subscribed_channels.clone(),
        }
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            client_id: self.client_id.clone(),
            subscribed_channels: self.subscribed_channels.clone(),
            data: self.data.clone(),
            transport: self.transport.kind(),
            origin: self.transport.origin().map(str::to_string),
        }
    }
}

impl std::fmt::Debug for ClientSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSubscription")
            .field("client_id", &self.client_id)
            .field("subscribed_channels", &self.subscribed_channels)
            .field("transport", &self.transport.kind())
            .finish_non_exhaustive()
    }
}

/// Serializable copy of a subscription for introspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    /// Client id.
    pub client_id: String,
    /// Its channels.
    pub subscribed_channels: Vec<String>,
    /// Its subscription data.
    pub data: Value,
    /// Transport kind.
    pub transport: TransportKind,
    /// Origin of an embedded client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    channels: IndexMap<String, Vec<Arc<ClientSubscription>>>,
    active: IndexMap<String, Arc<ClientSubscription>>,
}

/// Channel and active-client bookkeeping.
#[derive(Default)]
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
}

impl ClientRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription.
    ///
    /// Channels are de-duplicated and empty channel ids dropped. Returns
    /// the clients that were active before this one, plus the stored
    /// record.
    pub fn insert(
        &self,
        client_id: &str,
        channels: &[String],
        data: Value,
        transport: Arc<dyn Transport>,
    ) -> Result<(Vec<ActiveClient>, Arc<ClientSubscription>)> {
        if client_id.is_empty() {
            return Err(BrokerError::MissingParameter("clientId"));
        }
        let mut seen = HashSet::new();
        let subscribed_channels: Vec<String> = channels
            .iter()
            .filter(|c| !c.is_empty() && seen.insert(c.as_str()))
            .cloned()
            .collect();
        if subscribed_channels.is_empty() {
            return Err(BrokerError::MissingParameter("subscribedChannels"));
        }

        let mut state = self.state.lock();
        if state.active.contains_key(client_id) {
            return Err(BrokerError::AlreadySubscribed(client_id.to_string()));
        }

        let previous = state.active.values().map(|s| s.active_client()).collect();
        let subscription = Arc::new(ClientSubscription {
            client_id: client_id.to_string(),
            subscribed_channels,
            data,
            transport,
        });
        for channel in &subscription.subscribed_channels {
            state
                .channels
                .entry(channel.clone())
                .or_default()
                .push(Arc::clone(&subscription));
        }
        let _ = state
            .active
            .insert(client_id.to_string(), Arc::clone(&subscription));
        Ok((previous, subscription))
    }

    /// Remove a client from the active map and every channel list.
    ///
    /// Channels left without subscribers are dropped.
    pub fn remove(&self, client_id: &str) -> Result<Arc<ClientSubscription>> {
        if client_id.is_empty() {
            return Err(BrokerError::MissingParameter("clientId"));
        }
        let mut state = self.state.lock();
        let subscription = state
            .active
            .shift_remove(client_id)
            .ok_or_else(|| BrokerError::NotSubscribed(client_id.to_string()))?;
        for channel in &subscription.subscribed_channels {
            let now_empty = state.channels.get_mut(channel).is_some_and(|members| {
                members.retain(|m| m.client_id != client_id);
                members.is_empty()
            });
            if now_empty {
                let _ = state.channels.shift_remove(channel);
            }
        }
        Ok(subscription)
    }

    /// Subscribers of `channel_id` in subscription order, or `None` if the
    /// channel has no entry.
    pub fn channel_members(&self, channel_id: &str) -> Option<Vec<Arc<ClientSubscription>>> {
        self.state.lock().channels.get(channel_id).cloned()
    }

    /// Active subscription for `client_id`.
    pub fn get(&self, client_id: &str) -> Option<Arc<ClientSubscription>> {
        self.state.lock().active.get(client_id).cloned()
    }

    /// Whether `client_id` is active.
    pub fn is_active(&self, client_id: &str) -> bool {
        self.state.lock().active.contains_key(client_id)
    }

    /// Every distinct subscriber except `initiator`, in channel then
    /// subscription order.
    pub fn peers_of(&self, initiator: &str) -> Vec<Arc<ClientSubscription>> {
        let state = self.state.lock();
        let mut notified = HashSet::new();
        state
            .channels
            .values()
            .flatten()
            .filter(|s| s.client_id != initiator && notified.insert(s.client_id.as_str()))
            .cloned()
            .collect()
    }

    /// Active clients in subscription order.
    pub fn active_clients(&self) -> Vec<ActiveClient> {
        self.state
            .lock()
            .active
            .values()
            .map(|s| s.active_client())
            .collect()
    }

    /// Number of active clients.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Deep copy of the channel registry.
    pub fn snapshot(&self) -> IndexMap<String, Vec<ClientSnapshot>> {
        self.state
            .lock()
            .channels
            .iter()
            .map(|(channel, members)| {
                (
                    channel.clone(),
                    members.iter().map(|m| m.snapshot()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::endpoint::ConnectionChange;
    use crate::transport::Delivery;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::InProcess
        }
        async fn request(&self, _: &Delivery) -> Result<Option<Value>> {
            Ok(None)
        }
        async fn reply(&self, _: &str, _: &Delivery, _: Value) -> Result<()> {
            Ok(())
        }
        async fn notify(&self, _: &ConnectionChange) -> Result<()> {
            Ok(())
        }
    }

    fn channels(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    fn add(reg: &ClientRegistry, id: &str, chans: &[&str]) -> Result<Vec<ActiveClient>> {
        reg.insert(id, &channels(chans), json!({}), Arc::new(NullTransport))
            .map(|(prev, _)| prev)
    }

    fn member_ids(reg: &ClientRegistry, channel: &str) -> Vec<String> {
        reg.channel_members(channel)
            .unwrap_or_default()
            .iter()
            .map(|m| m.client_id.clone())
            .collect()
    }

    #[test]
    fn insert_returns_previously_active() {
        let reg = ClientRegistry::new();
        assert!(add(&reg, "A", &["chan1"]).unwrap().is_empty());
        let prev = add(&reg, "B", &["chan1", "chan2"]).unwrap();
        assert_eq!(
            prev,
            vec![ActiveClient {
                client_id: "A".into(),
                subscribed_channels: channels(&["chan1"]),
            }]
        );
        assert_eq!(member_ids(&reg, "chan1"), ["A", "B"]);
        assert_eq!(member_ids(&reg, "chan2"), ["B"]);
    }

    #[test]
    fn duplicate_subscribe_rejected() {
        let reg = ClientRegistry::new();
        add(&reg, "A", &["x"]).unwrap();
        assert_matches!(add(&reg, "A", &["y"]), Err(BrokerError::AlreadySubscribed(id)) if id == "A");
        assert!(reg.channel_members("y").is_none());
    }

    #[test]
    fn missing_parameters_rejected() {
        let reg = ClientRegistry::new();
        assert_matches!(add(&reg, "", &["x"]), Err(BrokerError::MissingParameter(_)));
        assert_matches!(add(&reg, "A", &[]), Err(BrokerError::MissingParameter(_)));
        assert_matches!(add(&reg, "A", &[""]), Err(BrokerError::MissingParameter(_)));
        assert_matches!(reg.remove(""), Err(BrokerError::MissingParameter(_)));
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn repeated_channel_joins_once() {
        let reg = ClientRegistry::new();
        add(&reg, "A", &["x", "x"]).unwrap();
        assert_eq!(member_ids(&reg, "x"), ["A"]);
        assert_eq!(reg.get("A").unwrap().subscribed_channels, ["x"]);
    }

    #[test]
    fn remove_clears_every_channel_and_drops_empty_entries() {
        let reg = ClientRegistry::new();
        add(&reg, "A", &["x", "y"]).unwrap();
        add(&reg, "B", &["x"]).unwrap();

        let removed = reg.remove("A").unwrap();
        assert_eq!(removed.subscribed_channels, ["x", "y"]);
        assert_eq!(member_ids(&reg, "x"), ["B"]);
        assert!(reg.channel_members("y").is_none());
        assert!(!reg.is_active("A"));
        assert_matches!(reg.remove("A"), Err(BrokerError::NotSubscribed(_)));
    }

    #[test]
    fn subscription_is_shared_across_channels() {
        let reg = ClientRegistry::new();
        add(&reg, "A", &["x", "y"]).unwrap();
        let in_x = reg.channel_members("x").unwrap().remove(0);
        let in_y = reg.channel_members("y").unwrap().remove(0);
        assert!(Arc::ptr_eq(&in_x, &in_y));
        assert!(Arc::ptr_eq(&in_x, &reg.get("A").unwrap()));
    }

    #[test]
    fn peers_are_distinct_and_exclude_initiator() {
        let reg = ClientRegistry::new();
        add(&reg, "A", &["x", "y"]).unwrap();
        add(&reg, "B", &["x", "y"]).unwrap();
        add(&reg, "C", &["y"]).unwrap();
        let peers: Vec<String> = reg.peers_of("B").iter().map(|p| p.client_id.clone()).collect();
        assert_eq!(peers, ["A", "C"]);
    }

    #[test]
    fn snapshot_is_deep_copy() {
        let reg = ClientRegistry::new();
        reg.insert("A", &channels(&["x"]), json!({"k": 1}), Arc::new(NullTransport))
            .unwrap();
        let snap = reg.snapshot();
        reg.remove("A").unwrap();
        assert_eq!(snap["x"][0].client_id, "A");
        assert_eq!(snap["x"][0].data, json!({"k": 1}));
        assert_eq!(snap["x"][0].transport, TransportKind::InProcess);
        assert!(reg.snapshot().is_empty());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Subscribe(u8, Vec<u8>),
        Unsubscribe(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, prop::collection::vec(0u8..4, 0..4)).prop_map(|(c, ch)| Op::Subscribe(c, ch)),
            (0u8..6).prop_map(Op::Unsubscribe),
        ]
    }

    proptest! {
        #[test]
        fn registry_invariants_hold(ops in prop::collection::vec(op(), 0..40)) {
            let reg = ClientRegistry::new();
            let mut model: IndexMap<String, Vec<String>> = IndexMap::new();

            for op in ops {
                match op {
                    Op::Subscribe(c, chans) => {
                        let id = format!("c{c}");
                        let chans: Vec<String> = chans.iter().map(|n| format!("ch{n}")).collect();
                        let res = reg.insert(&id, &chans, json!({}), Arc::new(NullTransport));
                        if chans.is_empty() {
                            prop_assert!(matches!(res, Err(BrokerError::MissingParameter(_))));
                        } else if model.contains_key(&id) {
                            prop_assert!(matches!(res, Err(BrokerError::AlreadySubscribed(_))));
                        } else {
                            prop_assert!(res.is_ok());
                            let mut unique = Vec::new();
                            for ch in chans {
                                if !unique.contains(&ch) {
                                    unique.push(ch);
                                }
                            }
                            let _ = model.insert(id, unique);
                        }
                    }
                    Op::Unsubscribe(c) => {
                        let id = format!("c{c}");
                        let res = reg.remove(&id);
                        if model.shift_remove(&id).is_some() {
                            prop_assert!(res.is_ok());
                        } else {
                            prop_assert!(matches!(res, Err(BrokerError::NotSubscribed(_))));
                        }
                    }
                }

                prop_assert_eq!(reg.active_count(), model.len());
                let snapshot = reg.snapshot();
                for (channel, members) in &snapshot {
                    prop_assert!(!members.is_empty(), "empty channel {} kept", channel);
                    for m in members {
                        let chans = model.get(&m.client_id);
                        prop_assert!(chans.is_some_and(|c| c.contains(channel)));
                    }
                }
                for (id, chans) in &model {
                    for ch in chans {
                        let members = snapshot.get(ch);
                        prop_assert!(members.is_some_and(|ms| ms.iter().filter(|m| &m.client_id == id).count() == 1));
                    }
                }
            }
        }
    }
}
