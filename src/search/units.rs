//! Text units: the pieces of the archive that get embedded

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::conversation::Conversation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Conversation,
    Message,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(Self::Conversation),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown unit kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextUnit {
    pub id: String,
    pub kind: UnitKind,
    pub conv_id: String,
    pub text: String,
}

/// Collect every embeddable unit in archive order
///
/// Each conversation contributes one unit represented by its first message,
/// followed by one unit per message. Ids come straight from the export, so the
/// output is stable across runs. Repeated ids keep their first occurrence.
pub fn extract_units(conversations: &[Conversation]) -> Vec<TextUnit> {
    let mut seen = HashSet::new();
    let mut units = Vec::new();

    let mut push = |unit: TextUnit| {
        if seen.insert(unit.id.clone()) {
            units.push(unit);
        } else {
            tracing::debug!(id = %unit.id, kind = %unit.kind, "skipping duplicate unit id");
        }
    };

    for conv in conversations {
        let Some(first) = conv.first_message() else {
            continue;
        };

        push(TextUnit {
            id: conv.id.clone(),
            kind: UnitKind::Conversation,
            conv_id: conv.id.clone(),
            text: first.text.clone(),
        });

        for msg in &conv.messages {
            push(TextUnit {
                id: msg.id.clone(),
                kind: UnitKind::Message,
                conv_id: conv.id.clone(),
                text: msg.text.clone(),
            });
        }
    }

    units
}
