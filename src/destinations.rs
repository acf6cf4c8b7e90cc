use crate::features::DestinationRef;
use crate::transport::{DeliveryError, Destination, Transport};
use std::time::Duration;
use tracing::{debug, warn};

/// A feature's configured destinations, resolved for one cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DestinationSet {
    /// Reachable destinations in configured order.
    pub resolved: Vec<Destination>,
    /// Channels the platform reported as not found.
    pub missing: Vec<u64>,
    /// Channels whose lookup failed for another reason.
    pub unreachable: Vec<u64>,
    /// Entries that are not channel ids at all.
    pub invalid: Vec<String>,
}

impl DestinationSet {
    /// Resolve every configured reference. One failing lookup never affects
    /// the others; duplicates are resolved once. A lookup that outlasts
    /// `timeout` counts as unreachable.
    pub async fn resolve(
        transport: &dyn Transport,
        refs: &[DestinationRef],
        timeout: Duration,
    ) -> Self {
        let mut set = Self::default();
        let mut visited: Vec<u64> = Vec::with_capacity(refs.len());

        for reference in refs {
            let Some(channel_id) = reference.channel_id() else {
                warn!("Skipping invalid destination {}", reference.describe());
                set.invalid.push(reference.describe());
                continue;
            };
            if visited.contains(&channel_id) {
                continue;
            }
            visited.push(channel_id);

            let lookup = tokio::time::timeout(timeout, transport.resolve_channel(channel_id));
            match lookup.await.unwrap_or(Err(DeliveryError::TimedOut(channel_id))) {
                Ok(destination) => {
                    debug!("Resolved channel {}", channel_id);
                    set.resolved.push(destination);
                }
                Err(DeliveryError::NotFound(_)) => {
                    warn!("Configured channel {} not found", channel_id);
                    set.missing.push(channel_id);
                }
                Err(e) => {
                    warn!("Could not resolve channel {}: {}", channel_id, e);
                    set.unreachable.push(channel_id);
                }
            }
        }

        set
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
