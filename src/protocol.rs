//! JSON-lines messages exchanged with the host editor and the rendering
//! surface. Every message is an object tagged by its `command` field.

use crate::error::ProtocolError;
use crate::model::{ContextTree, DocumentSymbol, Node, PathIdentity, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;

const INBOUND_COMMANDS: &[&str] = &[
    "activeFileChanged",
    "selectionChanged",
    "panelVisible",
    "updateDescription",
    "shutdown",
];

/// Messages accepted by the core: host events and surface edits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Inbound {
    /// Active editor switched; `path` is absolute, `null` when no editor is open.
    ActiveFileChanged {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Cursor moved. `symbols` carries the host's symbol tree for the
    /// document; when omitted the built-in outline provider is asked.
    SelectionChanged {
        #[serde(default)]
        path: Option<PathBuf>,
        line: u32,
        character: u32,
        #[serde(default)]
        symbols: Option<Vec<DocumentSymbol>>,
    },
    /// Rendering surface became visible again.
    PanelVisible {},
    /// User edited a description in the rendering surface.
    UpdateDescription {
        path: PathIdentity,
        description: String,
    },
    Shutdown {},
}

impl Inbound {
    pub fn position(&self) -> Option<Position> {
        match self {
            Inbound::SelectionChanged {
                line, character, ..
            } => Some(Position::new(*line, *character)),
            _ => None,
        }
    }
}

/// Payload of `updateInfo`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub tree: ContextTree,
    pub selected_symbol: Option<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Messages emitted by the core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Outbound {
    UpdateInfo {
        data: TreeView,
    },
    SetLoading {
        #[serde(rename = "isLoading")]
        is_loading: bool,
    },
    /// User-visible notification, handled by the host.
    ShowMessage {
        level: MessageLevel,
        message: String,
    },
}

impl Outbound {
    pub fn error(message: impl Into<String>) -> Self {
        Outbound::ShowMessage {
            level: MessageLevel::Error,
            message: message.into(),
        }
    }
}

/// Parse one inbound line. Unknown commands are rejected before any
/// field-level decoding.
pub fn parse_inbound(line: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(line)?;
    let command = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingCommand)?;
    if !INBOUND_COMMANDS.contains(&command) {
        return Err(ProtocolError::UnknownCommand(command.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Destination for outbound messages.
pub trait Sink {
    fn send(&mut self, message: &Outbound) -> io::Result<()>;
}

/// Writes one JSON object per line and flushes after each message.
pub struct JsonlSink<W: Write> {
    out: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Sink for JsonlSink<W> {
    fn send(&mut self, message: &Outbound) -> io::Result<()> {
        let line = serde_json::to_string(message)?;
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

impl Sink for Vec<Outbound> {
    fn send(&mut self, message: &Outbound) -> io::Result<()> {
        self.push(message.clone());
        Ok(())
    }
}
