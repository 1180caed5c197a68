//! Transport for clients living in this process.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{BrokerError, Result};

use super::{Delivery, Transport, TransportKind, non_null};
use crate::endpoint::{
    ClientMessage, ConnectionChange, ConnectionHandler, HandlerError, MessageHandler,
};

/// Invokes an in-process client's callbacks directly.
pub struct InProcessTransport {
    client_id: String,
    on_message: Arc<dyn MessageHandler>,
    on_connection: Arc<dyn ConnectionHandler>,
}

impl InProcessTransport {
    /// Wrap the callbacks of `client_id`.
    pub fn new(
        client_id: impl Into<String>,
        on_message: Arc<dyn MessageHandler>,
        on_connection: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            on_message,
            on_connection,
        }
    }

    fn handler_error(&self, err: &HandlerError) -> BrokerError {
        BrokerError::Handler {
            client_id: self.client_id.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InProcess
    }

    async fn request(&self, delivery: &Delivery) -> Result<Option<Value>> {
        let message = ClientMessage {
            sender_id: delivery.sender_id.clone(),
            channel_id: delivery.channel_id.clone(),
            message_name: delivery.message_name.clone(),
            data: delivery.data.clone(),
            request_id: None,
        };
        let answer = self
            .on_message
            .on_message(message)
            .await
            .map_err(|e| self.handler_error(&e))?;
        Ok(non_null(answer))
    }

    async fn reply(&self, responder_id: &str, delivery: &Delivery, data: Value) -> Result<()> {
        let message = ClientMessage {
            sender_id: responder_id.to_string(),
            channel_id: delivery.channel_id.clone(),
            message_name: delivery.message_name.clone(),
            data,
            request_id: Some(delivery.message_id.clone()),
        };
        let _ = self
            .on_message
            .on_message(message)
            .await
            .map_err(|e| self.handler_error(&e))?;
        Ok(())
    }

    async fn notify(&self, change: &ConnectionChange) -> Result<()> {
        self.on_connection
            .on_connection_change(change.clone())
            .await
            .map_err(|e| self.handler_error(&e))
    }
}
