//! Terminal chat: one session over stdin and stdout.
//!
//! Lines typed are utterances; `/en` and `/nl` switch language and `/quit`
//! ends the session.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use uuid::Uuid;

use clarify_core::config::ClarifyConfig;
use clarify_dialog::{
    ClientEvent, Collaborators, DialogSettings, Language, Orchestrator, ServerEvent,
    SessionOutcome, Transport,
};

pub struct StdioTransport {
    lines: Lines<BufReader<Stdin>>,
    stdout: Stdout,
    bot_name: String,
}

impl StdioTransport {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stdout: tokio::io::stdout(),
            bot_name: bot_name.into(),
        }
    }

    async fn write_line(&mut self, line: &str) {
        let written = async {
            self.stdout.write_all(line.as_bytes()).await?;
            self.stdout.write_all(b"\n").await?;
            self.stdout.flush().await
        };
        if let Err(e) = written.await {
            tracing::debug!(error = %e, "stdout closed");
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn receive(&mut self) -> Option<ClientEvent> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    return None;
                }
            };
            match line.trim() {
                "" => continue,
                "/quit" => return None,
                "/en" => return Some(ClientEvent::Language(Language::English)),
                "/nl" => return Some(ClientEvent::Language(Language::Dutch)),
                text => return Some(ClientEvent::Utterance(text.to_string())),
            }
        }
    }

    async fn send(&mut self, event: ServerEvent) {
        let line = match event {
            ServerEvent::Message(text) => format!("{}: {}", self.bot_name, plain_text(&text)),
            ServerEvent::Language(language) => format!("[{language}]"),
            ServerEvent::Echo(_) => return,
        };
        self.write_line(&line).await;
    }
}

/// Message text without HTML tags; links keep their target in brackets.
fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            rest = &rest[start..];
            break;
        };
        let tag = &rest[start + 1..start + end];
        if let Some(href) = tag
            .split_whitespace()
            .find_map(|attr| attr.strip_prefix("href=\""))
        {
            out.push('[');
            out.push_str(href.trim_end_matches('"'));
            out.push_str("] ");
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out.replace("&lt;", "<").replace("&gt;", ">")
}

/// Run a single console session to completion.
pub async fn run(config: &ClarifyConfig, collaborators: Collaborators) -> SessionOutcome {
    let settings = DialogSettings::from_config(&config.dialog);
    let transport = StdioTransport::new(settings.phrasebook.bot_name());
    let mut orchestrator = Orchestrator::new(Uuid::new_v4(), transport, collaborators, settings);
    if config.transcript.enabled {
        orchestrator = orchestrator.with_transcript(
            Path::new(&config.transcript.dir),
            config.transcript.min_lines,
        );
    }
    orchestrator.run().await
}
