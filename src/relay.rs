//! The relay core: fingerprint, coalesce, invoke, broadcast, cache.
//!
//! Every chat-completion request flows through [`RelayService::relay`]. The
//! service is generic over the invoker so the full coalescing pipeline runs
//! unchanged under test with a scripted upstream.

use std::time::Duration;

use tracing::{info, warn};

use crate::coalesce::{Acquired, Fingerprint, LastResultCache, PendingRegistry, WaitError};
use crate::types::{ChatRequest, ResponseSnapshot};
use crate::upstream::UpstreamInvoker;

/// Coalescing relay pipeline. Cheap to clone; clones share the registry and
/// the last-result cache.
#[derive(Clone)]
pub struct RelayService<U> {
    invoker: U,
    registry: PendingRegistry,
    cache: LastResultCache,
}

impl<U: UpstreamInvoker> RelayService<U> {
    pub fn new(invoker: U) -> Self {
        RelayService {
            invoker,
            registry: PendingRegistry::new(),
            cache: LastResultCache::new(),
        }
    }

    /// Relays a chat-completion request, coalescing concurrent duplicates.
    ///
    /// The first caller for a fingerprint performs the upstream call; every
    /// concurrent duplicate awaits that call's broadcast outcome instead.
    /// Upstream transport failures are converted into a 502 snapshot and
    /// broadcast exactly like a real answer, so followers never retry. A
    /// follower whose wait exceeds `wait_timeout` gets [`WaitError::Timeout`]
    /// without disturbing the leader.
    pub async fn relay(
        &self,
        request: &ChatRequest,
        upstream_timeout: Duration,
        wait_timeout: Duration,
    ) -> Result<ResponseSnapshot, WaitError> {
        let fingerprint = Fingerprint::for_chat(request);

        match self.registry.acquire(&fingerprint) {
            Acquired::Follower(handle) => {
                info!("joining in-flight upstream call");
                handle.wait(wait_timeout).await
            }
            Acquired::Leader => {
                // The server may drop this future mid-flight (client
                // disconnect). The guard then completes the entry with an
                // error snapshot so followers are released and the
                // fingerprint is free for a fresh attempt.
                let guard = LeaderGuard::new(self.registry.clone(), fingerprint);
                let snapshot = match self.invoker.invoke_chat(request, upstream_timeout).await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        warn!(error = %err, "upstream call failed");
                        ResponseSnapshot::bad_gateway(err)
                    }
                };
                guard.complete(snapshot.clone());
                self.cache.record(request, &snapshot);
                Ok(snapshot)
            }
        }
    }

    /// Replays the last completed result for this exact request, if any.
    ///
    /// Checks the cache first; if the same request is currently in flight,
    /// waits for it instead of answering empty-handed. Never triggers a new
    /// upstream call.
    pub async fn last_result(
        &self,
        request: &ChatRequest,
        wait_timeout: Duration,
    ) -> Option<ResponseSnapshot> {
        if let Some(snapshot) = self.cache.matching(request) {
            return Some(snapshot);
        }

        let fingerprint = Fingerprint::for_chat(request);
        match self.registry.subscribe_in_flight(&fingerprint) {
            Some(handle) => handle.wait(wait_timeout).await.ok(),
            None => None,
        }
    }

    /// The last-result cache, for direct inspection.
    pub fn cache(&self) -> &LastResultCache {
        &self.cache
    }
}

/// Ensures a leader's registry entry always completes.
///
/// A leader future dropped before completion would otherwise leave its entry
/// incomplete forever: later identical requests would all follow it and time
/// out, and the upstream would never be invoked again for that fingerprint.
struct LeaderGuard {
    registry: PendingRegistry,
    fingerprint: Fingerprint,
    armed: bool,
}

impl LeaderGuard {
    fn new(registry: PendingRegistry, fingerprint: Fingerprint) -> Self {
        LeaderGuard {
            registry,
            fingerprint,
            armed: true,
        }
    }

    fn complete(mut self, snapshot: ResponseSnapshot) {
        self.armed = false;
        self.registry.complete(&self.fingerprint, snapshot);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("leader dropped before completing; releasing waiters with an error");
            self.registry.complete(
                &self.fingerprint,
                ResponseSnapshot::internal_error("upstream call was interrupted before completion"),
            );
        }
    }
}
