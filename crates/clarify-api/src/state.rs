//! Application state shared across all route handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use clarify_core::config::ClarifyConfig;
use clarify_dialog::{
    ChannelTransport, ClientEvent, Collaborators, DialogSettings, Orchestrator, ServerEvent,
};

use crate::registry::{SessionHandle, SessionRegistry};

/// Inbound events buffered per session before the socket reader waits.
const INBOUND_BUFFER: usize = 32;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ClarifyConfig>,
    pub collaborators: Collaborators,
    pub settings: Arc<DialogSettings>,
    pub registry: Arc<SessionRegistry>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ClarifyConfig, collaborators: Collaborators) -> Self {
        let settings = DialogSettings::from_config(&config.dialog);
        Self {
            config: Arc::new(config),
            collaborators,
            settings: Arc::new(settings),
            registry: Arc::new(SessionRegistry::new()),
            start_time: Instant::now(),
        }
    }

    /// Start a conversation worker writing to `outbound` and register it.
    ///
    /// Returns the session id and the sender feeding the worker.
    pub fn spawn_session(
        &self,
        outbound: mpsc::Sender<ServerEvent>,
    ) -> (Uuid, mpsc::Sender<ClientEvent>) {
        let id = Uuid::new_v4();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let transport = ChannelTransport::new(inbound_rx, outbound);

        let mut orchestrator = Orchestrator::new(
            id,
            transport,
            self.collaborators.clone(),
            DialogSettings::clone(&self.settings),
        );
        let transcript = &self.config.transcript;
        if transcript.enabled {
            orchestrator = orchestrator.with_transcript(Path::new(&transcript.dir), transcript.min_lines);
        }

        let task = tokio::spawn(async move { orchestrator.run().await });
        self.registry
            .insert(id, SessionHandle::new(inbound_tx.clone(), task));
        info!(session = %id, "Session spawned");
        (id, inbound_tx)
    }
}
