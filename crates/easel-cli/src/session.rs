use std::sync::Arc;

use easel_contracts::messages::kinds;
use easel_contracts::{
    AdvertisedModel, AuthSuccess, ControlMessage, ModelCatalog, ModelSelector, ServerConfig,
};
use easel_engine::ImageBackend;
use tracing::{debug, info, warn};
use tungstenite::Message as WsMessage;

use crate::error::SessionError;
use crate::execute::TaskExecutor;
use crate::keepalive::Keepalive;
use crate::socket::{self, is_connection_closed, CloseOnDrop, FrameSink, Inbound, SharedSocket};

/// One connection attempt: dial, authenticate, advertise, then dispatch
/// inbound frames until the connection fails.
pub struct Session {
    server: ServerConfig,
    catalog: ModelCatalog,
    executor: TaskExecutor,
    token: Option<String>,
    server_models: Vec<AdvertisedModel>,
}

impl Session {
    pub fn new(server: ServerConfig, catalog: ModelCatalog, backend: Arc<dyn ImageBackend>) -> Self {
        let executor = TaskExecutor::new(ModelSelector::new(catalog.clone()), backend);
        Self {
            server,
            catalog,
            executor,
            token: None,
            server_models: Vec::new(),
        }
    }

    /// Bearer token from the last successful handshake.
    #[cfg(test)]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Models the server last announced via `models_update`.
    #[cfg(test)]
    pub fn server_models(&self) -> &[AdvertisedModel] {
        &self.server_models
    }

    /// Runs one session to completion. The dispatch loop only ends on error,
    /// so in practice this always returns `Err`.
    pub fn run(&mut self) -> Result<(), SessionError> {
        self.token = None;
        let socket = socket::dial(&self.server)?;
        let _close = CloseOnDrop(socket.clone());
        info!(url = %self.server.url(), "connected");

        self.authenticate(&socket)?;
        self.advertise(&socket)?;

        // Declared after `_close`, so the thread is joined before the close frame.
        let _keepalive = Keepalive::spawn(socket.clone(), self.server.keepalive_interval())
            .map_err(|err| SessionError::Protocol(format!("failed to start keepalive: {err}")))?;
        self.dispatch(&socket)
    }

    fn authenticate(&mut self, socket: &SharedSocket) -> Result<(), SessionError> {
        let request = ControlMessage::auth(&self.server.passcode)
            .map_err(|err| SessionError::Auth(format!("failed to encode auth request: {err}")))?;
        send_control(socket, &request).map_err(SessionError::Auth)?;

        let raw = match socket.next_inbound() {
            Ok(Inbound::Data(raw)) => raw,
            Ok(Inbound::Closed(reason)) => {
                return Err(SessionError::Auth(format!("closed before auth reply: {reason}")))
            }
            Err(err) => return Err(SessionError::Auth(format!("failed to read auth reply: {err}"))),
        };
        let reply = ControlMessage::decode(&raw)
            .map_err(|err| SessionError::Auth(format!("malformed auth reply: {err}")))?;
        if !reply.is(kinds::AUTH_SUCCESS) {
            return Err(SessionError::Auth(format!(
                "expected {}, got '{}'",
                kinds::AUTH_SUCCESS,
                reply.kind
            )));
        }
        let success: AuthSuccess = reply
            .payload_as()
            .map_err(|err| SessionError::Auth(format!("auth reply has no token: {err}")))?;
        self.token = Some(success.token);
        info!("authenticated");
        Ok(())
    }

    fn advertise(&self, socket: &SharedSocket) -> Result<(), SessionError> {
        let models = self.catalog.advertisement();
        let update = ControlMessage::models_update(&models).map_err(|err| {
            SessionError::Advertise(format!("failed to encode models_update: {err}"))
        })?;
        send_control(socket, &update).map_err(SessionError::Advertise)?;
        info!(count = models.len(), "models advertised");

        if self.server.request_models_on_connect {
            send_control(socket, &ControlMessage::get_models()).map_err(SessionError::Advertise)?;
            debug!("requested server model list");
        }
        Ok(())
    }

    fn dispatch(&mut self, socket: &SharedSocket) -> Result<(), SessionError> {
        loop {
            let raw = match socket.next_inbound() {
                Ok(Inbound::Data(raw)) => raw,
                Ok(Inbound::Closed(reason)) => return Err(SessionError::ConnectionClosed(reason)),
                Err(err) if is_connection_closed(&err) => {
                    return Err(SessionError::ConnectionClosed(err.to_string()))
                }
                Err(err) => return Err(SessionError::Protocol(format!("read failed: {err}"))),
            };
            let message = ControlMessage::decode(&raw)
                .map_err(|err| SessionError::Protocol(format!("undecodable frame: {err}")))?;

            match message.kind.as_str() {
                kinds::TASK => self.executor.handle_payload(socket, &message.payload),
                kinds::MODELS_UPDATE => match message.payload_as::<Vec<AdvertisedModel>>() {
                    Ok(models) => {
                        info!(count = models.len(), "server model list updated");
                        self.server_models = models;
                    }
                    Err(err) => warn!(error = %err, "ignoring malformed models_update"),
                },
                other => warn!(kind = other, "ignoring unknown message kind"),
            }
        }
    }
}

fn send_control(socket: &SharedSocket, message: &ControlMessage) -> Result<(), String> {
    let text = message
        .encode()
        .map_err(|err| format!("failed to encode {}: {err}", message.kind))?;
    socket
        .send_frame(WsMessage::Text(text.into()))
        .map_err(|err| format!("failed to send {}: {err}", message.kind))
}
