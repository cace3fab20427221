//! UI-agnostic conversation data types
//!
//! These structures are shared by every front end (terminal client, CLI)
//! and do not depend on any specific UI framework.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Who authored a message in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    /// Display text (markdown for bot replies)
    pub text: String,
    /// Raw accumulated text as it arrived from the stream
    pub raw: String,
    pub sources: Vec<Source>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            sender: Sender::User,
            raw: text.clone(),
            text,
            sources: Vec::new(),
        }
    }

    pub fn bot() -> Self {
        Self {
            sender: Sender::Bot,
            text: String::new(),
            raw: String::new(),
            sources: Vec::new(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

/// A retrieval result attached to a bot reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub doc_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub page_label: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_boxes")]
    pub bboxes: Vec<BoundingBox>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: f64,
}

/// Highlight rectangle in page-native coordinates (origin bottom-left)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// `(x1, y1, x2, y2)`; absent when the backend could not locate the excerpt
    #[serde(rename = "box", default, deserialize_with = "lenient_rect")]
    pub rect: Option<[f64; 4]>,
    #[serde(default, deserialize_with = "optional_text")]
    pub text_snippet: Option<String>,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            rect: Some([x1, y1, x2, y2]),
            text_snippet: None,
        }
    }
}

/// Backends are loose about ids and page labels; accept numbers as well.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Anything that is not a number (or a numeric string) scores 0.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

/// A rect is four numbers; any other shape means "not located".
fn lenient_rect<'de, D>(deserializer: D) -> Result<Option<[f64; 4]>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Some(items) = value.as_array().filter(|items| items.len() == 4) else {
        return Ok(None);
    };

    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        match item.as_f64() {
            Some(v) => *slot = v,
            None => return Ok(None),
        }
    }
    Ok(Some(rect))
}

/// Boxes that are not objects are skipped; a non-list counts as no boxes.
fn lenient_boxes<'de, D>(deserializer: D) -> Result<Vec<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}
