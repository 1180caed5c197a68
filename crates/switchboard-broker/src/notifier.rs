//! Connection event broadcast.

use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::endpoint::ConnectionChange;
use crate::registry::ClientSubscription;

/// Notify each peer of `change`. Failures are logged and swallowed.
///
/// Returns the number of peers notified successfully.
pub async fn notify_peers(peers: &[Arc<ClientSubscription>], change: &ConnectionChange) -> usize {
    let results = join_all(peers.iter().map(|peer| async move {
        let result = peer.transport.notify(change).await;
        if let Err(e) = &result {
            warn!(
                client_id = %peer.client_id,
                about = %change.client_id,
                event = change.kind.as_str(),
                error = %e,
                "connection notification failed"
            );
        }
        result.is_ok()
    }))
    .await;
    results.into_iter().filter(|ok| *ok).count()
}
