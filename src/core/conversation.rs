//! Conversation archive loading
//!
//! Parses the exported `conversations.json` (a list of conversations whose
//! messages live in a `mapping` tree keyed by node id) and flattens every
//! conversation into an ordered list of non-empty messages.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// Display format for timestamps
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const UNTITLED: &str = "Untitled";

/// A single non-empty message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: String,
    pub text: String,
    pub created: DateTime<Utc>,
}

impl Message {
    pub fn created_str(&self) -> String {
        format_time(&self.created)
    }
}

/// A conversation with its messages flattened in export order
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn title_str(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => UNTITLED,
        }
    }

    pub fn created_str(&self) -> String {
        format_time(&self.created)
    }

    pub fn first_message(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn find_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Timestamp of the newest message, or the creation time if there are none
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .iter()
            .map(|m| m.created)
            .max()
            .unwrap_or(self.created)
    }
}

/// The whole archive, in export order, with an id lookup table
#[derive(Debug, Clone, Default)]
pub struct Archive {
    conversations: Vec<Conversation>,
    by_id: HashMap<String, usize>,
}

impl Archive {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        let mut by_id = HashMap::with_capacity(conversations.len());
        for (pos, conv) in conversations.iter().enumerate() {
            by_id.entry(conv.id.clone()).or_insert(pos);
        }
        Self {
            conversations,
            by_id,
        }
    }

    /// Load and parse an export file
    ///
    /// Any shape error is returned; callers treat it as fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read archive {}", path.display()))?;
        let archive = Self::from_json(&raw)
            .with_context(|| format!("Malformed archive {}", path.display()))?;
        tracing::info!(
            conversations = archive.len(),
            messages = archive.message_count(),
            "loaded conversation archive"
        );
        Ok(archive)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: Vec<RawConversation> = serde_json::from_str(raw)?;
        let conversations = parsed
            .into_iter()
            .map(Conversation::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(conversations))
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.by_id.get(id).map(|&pos| &self.conversations[pos])
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.conversations.iter().map(|c| c.messages.len()).sum()
    }
}

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn timestamp(secs: f64) -> Result<DateTime<Utc>> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    Utc.timestamp_opt(whole as i64, nanos)
        .single()
        .with_context(|| format!("Timestamp out of range: {}", secs))
}

// ===== Export format =====

#[derive(Deserialize)]
struct RawConversation {
    id: String,
    title: Option<String>,
    create_time: f64,
    update_time: Option<f64>,
    #[serde(deserialize_with = "ordered_nodes")]
    mapping: Vec<RawNode>,
}

#[derive(Deserialize)]
struct RawNode {
    message: Option<RawMessage>,
}

#[derive(Deserialize)]
struct RawMessage {
    id: String,
    author: RawAuthor,
    create_time: Option<f64>,
    content: Option<RawContent>,
}

#[derive(Deserialize)]
struct RawAuthor {
    role: String,
}

#[derive(Deserialize)]
struct RawContent {
    parts: Option<Vec<serde_json::Value>>,
    text: Option<String>,
}

impl RawContent {
    fn text(&self) -> String {
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }
        match &self.parts {
            Some(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>()
                .join(" "),
            None => String::new(),
        }
    }
}

impl TryFrom<RawConversation> for Conversation {
    type Error = anyhow::Error;

    fn try_from(raw: RawConversation) -> Result<Self> {
        let created = timestamp(raw.create_time)?;
        let updated = match raw.update_time {
            Some(t) => timestamp(t)?,
            None => created,
        };

        let mut messages = Vec::new();
        for node in raw.mapping {
            let Some(msg) = node.message else { continue };
            let text = msg.content.as_ref().map(RawContent::text).unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let created = match msg.create_time {
                Some(t) => timestamp(t)?,
                None => created,
            };
            messages.push(Message {
                id: msg.id,
                role: msg.author.role,
                text,
                created,
            });
        }

        Ok(Self {
            id: raw.id,
            title: raw.title,
            created,
            updated,
            messages,
        })
    }
}

/// Deserialize a JSON object into its values, keeping document order
fn ordered_nodes<'de, D>(deserializer: D) -> std::result::Result<Vec<RawNode>, D::Error>
where
    D: Deserializer<'de>,
{
    struct NodesVisitor;

    impl<'de> Visitor<'de> for NodesVisitor {
        type Value = Vec<RawNode>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of message nodes")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut nodes = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((_key, node)) = map.next_entry::<String, RawNode>()? {
                nodes.push(node);
            }
            Ok(nodes)
        }
    }

    deserializer.deserialize_map(NodesVisitor)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn message(id: &str, role: &str, text: &str, created: i64) -> Message {
        Message {
            id: id.to_string(),
            role: role.to_string(),
            text: text.to_string(),
            created: Utc.timestamp_opt(created, 0).unwrap(),
        }
    }

    pub fn conversation(id: &str, title: &str, created: i64, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: Some(title.to_string()),
            created: Utc.timestamp_opt(created, 0).unwrap(),
            updated: Utc.timestamp_opt(created, 0).unwrap(),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"[
      {
        "id": "conv-1",
        "title": "Trip to Japan",
        "create_time": 1700000000.5,
        "update_time": 1700000500.0,
        "mapping": {
          "root": { "id": "root", "message": null },
          "n3": {
            "id": "n3",
            "message": {
              "id": "m3", "author": { "role": "user" }, "create_time": 1700000100.0,
              "content": { "content_type": "text", "parts": ["Where should I stay in Kyoto?"] }
            }
          },
          "n1": {
            "id": "n1",
            "message": {
              "id": "m1", "author": { "role": "system" }, "create_time": null,
              "content": { "content_type": "text", "parts": [""] }
            }
          },
          "n2": {
            "id": "n2",
            "message": {
              "id": "m2", "author": { "role": "assistant" }, "create_time": null,
              "content": { "content_type": "code", "text": "print('hi')", "parts": null }
            }
          }
        }
      },
      {
        "id": "conv-2",
        "title": null,
        "create_time": 1700100000,
        "update_time": null,
        "mapping": {}
      }
    ]"#;

    #[test]
    fn test_parse_export() -> Result<()> {
        let archive = Archive::from_json(EXPORT)?;
        assert_eq!(archive.len(), 2);

        let conv = archive.get("conv-1").unwrap();
        assert_eq!(conv.title_str(), "Trip to Japan");

        // Mapping order is preserved, empty messages are dropped
        let ids: Vec<&str> = conv.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2"]);
        assert_eq!(conv.messages[1].text, "print('hi')");

        // Missing create_time falls back to the conversation's
        assert_eq!(conv.messages[1].created, conv.created);

        let empty = archive.get("conv-2").unwrap();
        assert_eq!(empty.title_str(), "Untitled");
        assert!(empty.first_message().is_none());
        assert_eq!(empty.updated, empty.created);
        Ok(())
    }

    #[test]
    fn test_parts_joined() -> Result<()> {
        let content = RawContent {
            parts: Some(vec![
                serde_json::json!("look at"),
                serde_json::Value::Null,
                serde_json::json!({"asset": "file-1"}),
            ]),
            text: None,
        };
        assert_eq!(content.text(), r#"look at {"asset":"file-1"}"#);
        Ok(())
    }

    #[test]
    fn test_malformed_export_fails() {
        assert!(Archive::from_json(r#"[{"id": "x"}]"#).is_err());
        assert!(Archive::from_json("{}").is_err());
    }

    #[test]
    fn test_last_activity() {
        let conv = fixtures::conversation(
            "c",
            "t",
            100,
            vec![
                fixtures::message("a", "user", "one", 150),
                fixtures::message("b", "assistant", "two", 400),
            ],
        );
        assert_eq!(conv.last_activity().timestamp(), 400);
    }
}
