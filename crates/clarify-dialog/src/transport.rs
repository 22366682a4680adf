//! Per-session message transport and input sanitisation.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{ClientEvent, ServerEvent};

/// Duplex channel to one user.
#[async_trait]
pub trait Transport: Send {
    /// Next inbound event; `None` once the user has disconnected.
    async fn receive(&mut self) -> Option<ClientEvent>;

    async fn send(&mut self, event: ServerEvent);
}

/// [`Transport`] over a pair of tokio channels.
///
/// Dropping the inbound sender ends the session: the pending `receive`
/// returns `None`.
pub struct ChannelTransport {
    inbound: mpsc::Receiver<ClientEvent>,
    outbound: mpsc::Sender<ServerEvent>,
}

impl ChannelTransport {
    pub fn new(inbound: mpsc::Receiver<ClientEvent>, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self { inbound, outbound }
    }

    /// A transport plus the far ends of both channels.
    pub fn pair(
        buffer: usize,
    ) -> (Self, mpsc::Sender<ClientEvent>, mpsc::Receiver<ServerEvent>) {
        let (in_tx, in_rx) = mpsc::channel(buffer);
        let (out_tx, out_rx) = mpsc::channel(buffer);
        (Self::new(in_rx, out_tx), in_tx, out_rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&mut self) -> Option<ClientEvent> {
        self.inbound.recv().await
    }

    async fn send(&mut self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!("Outbound channel closed, message dropped");
        }
    }
}

// =============================================================================
// Sanitisation
// =============================================================================

static QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"&´`]"#).expect("Invalid quote regex"));
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<.*?>|;*&lt;*|;*&gt;*|/").expect("Invalid markup regex"));

/// A user message made safe to echo and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    /// Markup was stripped; the user gets a "nice try" message.
    pub tampered: bool,
}

/// Strip quotes and markup from a raw message.
///
/// Quotes, ampersands and backticks become spaces. Tags, escaped angle
/// brackets and slashes are removed, and any stray `<` or `>` is escaped.
pub fn sanitize(raw: &str) -> Sanitized {
    let unquoted = QUOTES.replace_all(raw, " ");
    let unquoted = unquoted.trim();
    let stripped = MARKUP.replace_all(unquoted, " ");
    let text = stripped
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .trim()
        .to_string();
    let tampered = text.chars().count() != unquoted.chars().count();
    Sanitized { text, tampered }
}
