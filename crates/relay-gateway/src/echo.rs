use async_trait::async_trait;
use relay_hub::{HubError, HubHandle, InboundHandler, Message};

/// Default inbound handler: decode the payload as a [`Message`] envelope and
/// re-broadcast it unchanged, so clients can publish to each other.
pub struct EchoHandler;

#[async_trait]
impl InboundHandler for EchoHandler {
    async fn handle(&self, payload: &[u8], hub: &HubHandle) -> Result<(), HubError> {
        let msg: Message = serde_json::from_slice(payload)?;
        hub.broadcast(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_hub::Hub;
    use std::sync::Arc;

    #[tokio::test]
    async fn valid_envelope_is_rebroadcast() {
        // the hub never runs here; holding it keeps the command queue open
        let (_hub, handle) = Hub::build(8, Arc::new(EchoHandler));
        let payload = serde_json::to_vec(&Message::new("usertest", 1, b"hi".to_vec())).unwrap();
        assert!(EchoHandler.handle(&payload, &handle).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_payload_is_an_application_error() {
        let (_hub, handle) = Hub::build(8, Arc::new(EchoHandler));
        let err = EchoHandler.handle(b"not json", &handle).await.unwrap_err();
        assert!(matches!(err, HubError::Serialization(_)));
    }
}
