//! Per-connection session lifetime

use burrow_proto::{ConnectionRequest, User};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::error::SessionError;
use crate::service::SessionService;
use crate::transport::ClientConnection;

/// Drives one client session from connect to termination.
///
/// The session ends when the transport closes or when its context is
/// cancelled (operator request, shutdown). Either way it is terminated once.
#[derive(Clone)]
pub struct ClientConnectionHandler {
    service: Arc<SessionService>,
}

impl ClientConnectionHandler {
    pub fn new(service: Arc<SessionService>) -> Self {
        Self { service }
    }

    /// Handle a connection until the session ends.
    ///
    /// Returns the error from session start-up, after closing the connection.
    /// Errors from termination are logged.
    pub async fn handle(
        &self,
        session_id: String,
        connection: Arc<dyn ClientConnection>,
        request: ConnectionRequest,
        user: Option<User>,
        context: CancellationToken,
    ) -> Result<(), SessionError> {
        let span = info_span!(
            "client_session",
            session_id = %session_id,
            addr = %connection.remote_address()
        );

        let session = match self
            .service
            .start_client_session(
                context.clone(),
                session_id,
                connection.clone(),
                &request,
                user,
                span.clone(),
            )
            .instrument(span.clone())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(parent: &span, "Failed to start client session: {}", e);
                connection
                    .close(&format!("session start failed: {}", e))
                    .await;
                return Err(e);
            }
        };

        tokio::select! {
            _ = connection.closed() => {
                info!(parent: &span, "Client connection closed");
            }
            _ = context.cancelled() => {
                info!(parent: &span, "Client session cancelled");
                connection.close("session terminated").await;
            }
        }

        if let Err(e) = self.service.terminate(&session).await {
            error!(parent: &span, "Failed to terminate client session: {}", e);
        }
        Ok(())
    }
}
