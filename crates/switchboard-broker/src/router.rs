//! Publish routing: target resolution and fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use switchboard_core::constants::WILDCARD_TARGET;
use switchboard_core::{BrokerError, Result};
use tracing::{debug, warn};

use crate::registry::{ClientRegistry, ClientSubscription};
use crate::transport::Delivery;

/// Arguments of a publish.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishRequest {
    /// Channel to publish on.
    pub channel_id: String,
    /// Publishing client.
    pub sender_id: String,
    /// Request id; replies are tagged with it.
    pub message_id: String,
    /// Application message name.
    pub message_name: String,
    /// `["*"]` for every subscriber, or explicit client ids.
    pub target_client_ids: Vec<String>,
    /// Payload.
    pub data: Value,
}

/// A reply produced by one target.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReply {
    /// Responding client.
    pub client_id: String,
    /// Reply payload.
    pub data: Value,
}

/// Outcome of a publish.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    /// Clients the message was delivered to, in fan-out order.
    pub delivered: Vec<String>,
    /// Replies, in fan-out order.
    pub replies: Vec<PublishReply>,
}

impl PublishReport {
    /// Ids of the clients that replied.
    pub fn replied(&self) -> Vec<&str> {
        self.replies.iter().map(|r| r.client_id.as_str()).collect()
    }
}

/// Resolve the delivery set of a publish within `members`.
///
/// A `"*"` anywhere in `targets` selects every member; the first one wins
/// and the rest of the list is ignored. Otherwise each id is looked up,
/// unknown ids are dropped and repeats collapse.
pub fn resolve_targets(
    channel_id: &str,
    members: &[Arc<ClientSubscription>],
    targets: &[String],
) -> Result<Vec<Arc<ClientSubscription>>> {
    let resolved: Vec<Arc<ClientSubscription>> =
        if targets.iter().any(|t| t == WILDCARD_TARGET) {
            members.to_vec()
        } else {
            let mut seen = HashSet::new();
            targets
                .iter()
                .filter(|t| seen.insert(t.as_str()))
                .filter_map(|t| members.iter().find(|m| m.client_id == **t).cloned())
                .collect()
        };
    if resolved.is_empty() {
        return Err(BrokerError::TargetsNotFound {
            channel_id: channel_id.to_string(),
        });
    }
    Ok(resolved)
}

/// Deliver a publish to its targets and relay replies to the sender.
///
/// Targets are contacted concurrently and every one of them is attempted.
/// The sender is skipped even when selected. Replies from healthy targets
/// are relayed even when another target fails; the first failure in
/// fan-out order is then returned.
pub async fn publish(registry: &ClientRegistry, request: PublishRequest) -> Result<PublishReport> {
    let members = registry
        .channel_members(&request.channel_id)
        .ok_or_else(|| BrokerError::UnknownChannel(request.channel_id.clone()))?;
    let targets = resolve_targets(&request.channel_id, &members, &request.target_client_ids)?;
    let sender = registry.get(&request.sender_id);
    if sender.is_none() {
        debug!(sender_id = %request.sender_id, "publishing client is not subscribed, replies will be dropped");
    }

    let delivery = Delivery {
        sender_id: request.sender_id,
        channel_id: request.channel_id,
        message_id: request.message_id,
        message_name: request.message_name,
        data: request.data,
    };

    let sends = targets
        .iter()
        .filter(|t| t.client_id != delivery.sender_id)
        .map(|target| deliver_one(target, sender.as_deref(), &delivery));
    let outcomes = join_all(sends).await;

    let mut report = PublishReport::default();
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok((client_id, reply)) => {
                if let Some(data) = reply {
                    report.replies.push(PublishReply {
                        client_id: client_id.clone(),
                        data,
                    });
                }
                report.delivered.push(client_id);
            }
            Err(e) => {
                warn!(error = %e, "delivery failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

async fn deliver_one(
    target: &ClientSubscription,
    sender: Option<&ClientSubscription>,
    delivery: &Delivery,
) -> Result<(String, Option<Value>)> {
    let reply = target.transport.request(delivery).await?;
    if let Some(data) = &reply {
        match sender {
            Some(sender) => {
                sender
                    .transport
                    .reply(&target.client_id, delivery, data.clone())
                    .await?;
            }
            None => warn!(
                sender_id = %delivery.sender_id,
                responder = %target.client_id,
                "reply dropped, sender is not subscribed"
            ),
        }
    }
    Ok((target.client_id.clone(), reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::endpoint::ConnectionChange;
    use crate::transport::{Transport, TransportKind};

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<Delivery>>,
        replies: Mutex<Vec<(String, String, Value)>>,
        answer: Option<Value>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for Recorder {
        fn kind(&self) -> TransportKind {
            TransportKind::InProcess
        }
        async fn request(&self, delivery: &Delivery) -> Result<Option<Value>> {
            self.requests.lock().push(delivery.clone());
            if self.fail {
                return Err(BrokerError::Handler {
                    client_id: "C".into(),
                    reason: "boom".into(),
                });
            }
            Ok(self.answer.clone())
        }
        async fn reply(&self, responder_id: &str, delivery: &Delivery, data: Value) -> Result<()> {
            self.replies.lock().push((
                responder_id.to_string(),
                delivery.message_id.clone(),
                data,
            ));
            Ok(())
        }
        async fn notify(&self, _: &ConnectionChange) -> Result<()> {
            Ok(())
        }
    }

    fn setup(answers: &[(&str, Option<Value>)]) -> (ClientRegistry, Vec<Arc<Recorder>>) {
        setup_with_failures(answers, &[])
    }

    fn setup_with_failures(
        answers: &[(&str, Option<Value>)],
        failing: &[&str],
    ) -> (ClientRegistry, Vec<Arc<Recorder>>) {
        let reg = ClientRegistry::new();
        let mut recorders = Vec::new();
        for (id, answer) in answers {
            let rec = Arc::new(Recorder {
                answer: answer.clone(),
                fail: failing.contains(id),
                ..Recorder::default()
            });
            let _ = reg
                .insert(id, &["x".to_string()], json!({}), rec.clone())
                .unwrap();
            recorders.push(rec);
        }
        (reg, recorders)
    }

    fn request(targets: &[&str]) -> PublishRequest {
        PublishRequest {
            channel_id: "x".into(),
            sender_id: "A".into(),
            message_id: "id-1".into(),
            message_name: "msg".into(),
            target_client_ids: targets.iter().map(|s| (*s).to_string()).collect(),
            data: json!({"d": true}),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_but_sender() {
        let (reg, recs) = setup(&[("A", None), ("B", None), ("C", None)]);
        let report = publish(&reg, request(&["*"])).await.unwrap();
        assert_eq!(report.delivered, ["B", "C"]);
        assert!(recs[0].requests.lock().is_empty());
        assert_eq!(recs[1].requests.lock().len(), 1);
        assert_eq!(recs[2].requests.lock()[0].data, json!({"d": true}));
    }

    #[tokio::test]
    async fn targeted_delivery_reaches_only_target() {
        let (reg, recs) = setup(&[("A", None), ("B", None), ("C", None)]);
        let report = publish(&reg, request(&["B"])).await.unwrap();
        assert_eq!(report.delivered, ["B"]);
        assert!(recs[2].requests.lock().is_empty());
    }

    #[tokio::test]
    async fn first_wildcard_wins_over_explicit_ids() {
        let (reg, _) = setup(&[("A", None), ("B", None), ("C", None)]);
        let report = publish(&reg, request(&["C", "*", "nobody"])).await.unwrap();
        assert_eq!(report.delivered, ["B", "C"]);
    }

    #[tokio::test]
    async fn unknown_ids_dropped_and_repeats_collapse() {
        let (reg, recs) = setup(&[("A", None), ("B", None)]);
        let report = publish(&reg, request(&["ghost", "B", "B"])).await.unwrap();
        assert_eq!(report.delivered, ["B"]);
        assert_eq!(recs[1].requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn no_resolved_target_fails() {
        let (reg, _) = setup(&[("A", None)]);
        assert_matches!(
            publish(&reg, request(&["ghost"])).await,
            Err(BrokerError::TargetsNotFound { channel_id }) if channel_id == "x"
        );
        assert_matches!(
            publish(&reg, request(&[])).await,
            Err(BrokerError::TargetsNotFound { .. })
        );
    }

    #[tokio::test]
    async fn unknown_channel_fails() {
        let (reg, _) = setup(&[("A", None)]);
        let mut req = request(&["*"]);
        req.channel_id = "nope".into();
        assert_matches!(publish(&reg, req).await, Err(BrokerError::UnknownChannel(c)) if c == "nope");
    }

    #[tokio::test]
    async fn sender_only_target_delivers_nothing() {
        let (reg, _) = setup(&[("A", None)]);
        let report = publish(&reg, request(&["A"])).await.unwrap();
        assert!(report.delivered.is_empty());
    }

    #[tokio::test]
    async fn replies_are_relayed_to_sender_with_original_id() {
        let (reg, recs) = setup(&[("A", None), ("B", Some(json!("v"))), ("C", None)]);
        let report = publish(&reg, request(&["*"])).await.unwrap();
        assert_eq!(report.replied(), ["B"]);
        assert_eq!(
            *recs[0].replies.lock(),
            vec![("B".to_string(), "id-1".to_string(), json!("v"))]
        );
    }

    #[tokio::test]
    async fn failing_target_does_not_starve_later_targets() {
        let (reg, recs) = setup_with_failures(
            &[("A", None), ("C", None), ("B", Some(json!("pong")))],
            &["C"],
        );
        assert_matches!(
            publish(&reg, request(&["*"])).await,
            Err(BrokerError::Handler { client_id, .. }) if client_id == "C"
        );
        assert_eq!(recs[2].requests.lock().len(), 1);
        assert_eq!(
            *recs[0].replies.lock(),
            vec![("B".to_string(), "id-1".to_string(), json!("pong"))]
        );
    }

    #[tokio::test]
    async fn unsubscribed_sender_still_publishes() {
        let (reg, recs) = setup(&[("B", Some(json!(1)))]);
        let report = publish(&reg, request(&["B"])).await.unwrap();
        assert_eq!(report.replied(), ["B"]);
        assert_eq!(recs[0].requests.lock().len(), 1);
    }
}
