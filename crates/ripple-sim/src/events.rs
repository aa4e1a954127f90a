use ripple_core::{ColourState, PeerId};
use serde::Serialize;
use std::io::Write;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub mode: String,
    pub nodes: usize,
    pub port: u16,
}

impl EventStarted {
    pub fn new(mode: &str, nodes: usize, port: u16) -> Self {
        Self {
            event: "started",
            mode: mode.to_string(),
            nodes,
            port,
        }
    }
}

#[derive(Serialize)]
pub struct EventNode {
    pub event: &'static str,
    pub index: usize,
    pub id: PeerId,
}

// ── Relay events ────────────────────────────────────────────────

/// One node repainted by an incoming message.
#[derive(Serialize)]
pub struct EventHop {
    pub event: &'static str,
    pub index: usize,
    pub node: PeerId,
    pub colour: ColourState,
    /// Next hop when the node passed the message on.
    pub relayed_to: Option<PeerId>,
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

#[derive(Serialize)]
pub struct EventSendFailed {
    pub event: &'static str,
    pub target: PeerId,
    pub error: String,
}

// ── Summary ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventSummary {
    pub event: &'static str,
    pub mode: String,
    pub colour: ColourState,
    pub painted: usize,
    pub expected: usize,
    pub send_failures: usize,
    pub elapsed_s: f64,
}
