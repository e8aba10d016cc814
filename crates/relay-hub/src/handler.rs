use async_trait::async_trait;

use crate::error::HubError;
use crate::hub::HubHandle;

/// Callback invoked on the hub's dispatch path for every inbound client
/// payload, whatever connection it arrived on.
///
/// Implementations must be `Send + Sync` and must not perform unbounded
/// waits: the dispatch loop is suspended while the handler runs. Decoding
/// the payload is the handler's job; it may call [`HubHandle::broadcast`]
/// to re-publish. A returned error is logged and dropped, never fatal to
/// the hub or the originating connection.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, payload: &[u8], hub: &HubHandle) -> Result<(), HubError>;
}

/// Plain functions and closures work as handlers directly.
#[async_trait]
impl<F> InboundHandler for F
where
    F: Fn(&[u8], &HubHandle) -> Result<(), HubError> + Send + Sync,
{
    async fn handle(&self, payload: &[u8], hub: &HubHandle) -> Result<(), HubError> {
        self(payload, hub)
    }
}
