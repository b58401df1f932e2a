//! Replaceable shared HTTP client

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{Result, TransportError};
use crate::request::Attempt;
use crate::transport::{AttemptResponse, Transport, TransportFactory};

/// One generation of the shared client.
///
/// A forward takes a lease once and uses it for all of its attempts, so a
/// concurrent [`ClientHandle::rebuild`] never changes the client under it.
pub struct ClientLease {
    generation: u64,
    transport: Arc<dyn Transport>,
}

impl ClientLease {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn send(&self, attempt: &Attempt) -> std::result::Result<AttemptResponse, TransportError> {
        self.transport.send(attempt).await
    }
}

impl std::fmt::Debug for ClientLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLease")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Holder of the current shared client
pub struct ClientHandle {
    factory: Arc<dyn TransportFactory>,
    current: RwLock<Arc<ClientLease>>,
}

impl ClientHandle {
    /// Build the first client (generation 1).
    pub fn new(factory: impl TransportFactory + 'static) -> Result<Self> {
        Self::from_factory(Arc::new(factory))
    }

    pub fn from_factory(factory: Arc<dyn TransportFactory>) -> Result<Self> {
        let transport = factory.build_transport()?;
        Ok(Self {
            factory,
            current: RwLock::new(Arc::new(ClientLease {
                generation: 1,
                transport,
            })),
        })
    }

    /// Lease the current client.
    pub fn current(&self) -> Arc<ClientLease> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Replace the shared client with a freshly built one.
    ///
    /// The new client is built before the swap; on failure the current
    /// client stays in place. Leases already handed out keep working.
    pub fn rebuild(&self) -> Result<u64> {
        let transport = self.factory.build_transport()?;
        let mut current = self.current.write();
        let generation = current.generation + 1;
        *current = Arc::new(ClientLease {
            generation,
            transport,
        });
        drop(current);
        info!(generation, "Rebuilt HTTP client");
        Ok(generation)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedFactory, ScriptedOutcome, ScriptedTransport};
    use pcp_core::ForwardRequest;
    use url::Url;

    fn attempt() -> Attempt {
        let request = ForwardRequest::get("https://phone.local", "/x");
        Attempt::build(Url::parse("https://phone.local/x").unwrap(), &request).unwrap()
    }

    #[test]
    fn test_initial_generation() {
        let factory = ScriptedFactory::new();
        let handle = ClientHandle::new(factory.clone()).unwrap();
        assert_eq!(handle.generation(), 1);
        assert_eq!(factory.builds(), 1);
    }

    #[test]
    fn test_rebuild_bumps_generation() {
        let factory = ScriptedFactory::new();
        let handle = ClientHandle::new(factory.clone()).unwrap();

        assert_eq!(handle.rebuild().unwrap(), 2);
        assert_eq!(handle.rebuild().unwrap(), 3);
        assert_eq!(handle.generation(), 3);
        assert_eq!(factory.builds(), 3);
    }

    #[tokio::test]
    async fn test_lease_survives_rebuild() {
        let first = ScriptedTransport::new(vec![ScriptedOutcome::respond(204, "")]);
        let handle = ClientHandle::from_factory(Arc::new(ScriptedFactory::with_transport(
            first.clone(),
        )))
        .unwrap();

        let lease = handle.current();
        handle.rebuild().unwrap();

        assert_eq!(lease.generation(), 1);
        assert_eq!(handle.current().generation(), 2);
        let response = lease.send(&attempt()).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(first.attempts().len(), 1);
    }

    #[test]
    fn test_failed_rebuild_keeps_current_client() {
        let factory = ScriptedFactory::new();
        let handle = ClientHandle::new(factory.clone()).unwrap();

        factory.fail_next_build();
        assert!(handle.rebuild().is_err());
        assert_eq!(handle.generation(), 1);
    }
}
