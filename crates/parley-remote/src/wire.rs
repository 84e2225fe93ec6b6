//! JSON shapes exchanged with the deployment API.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use parley_core::types::{Citation, ContentBlock, Message};
use regex::Regex;
use serde::{Deserialize, Serialize};

// `{{ name }}` placeholders in prompt templates.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("Invalid placeholder regex")
});

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ConfigRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Debug, Serialize)]
pub struct WireImageUrl<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    pub content: Vec<WirePart<'a>>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => WirePart::Text { text },
                    ContentBlock::ImageRef { url } => WirePart::ImageUrl {
                        image_url: WireImageUrl { url },
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvokeOptions {
    pub include_retrievals: bool,
}

#[derive(Debug, Serialize)]
pub struct InvokeBody<'a> {
    pub key: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<&'a str>,
    pub invoke_options: InvokeOptions,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadedFile {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct InvokeResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub retrievals: Vec<Retrieval>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
    /// Retrieved chunk text.
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub metadata: RetrievalMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrievalMetadata {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub page_number: f64,
}

impl InvokeResponse {
    /// Text of the first choice, if the deployment produced one.
    pub fn reply_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// Retrievals as citations, in the order returned.
    pub fn citations(&self) -> Vec<Citation> {
        self.retrievals
            .iter()
            .map(|r| Citation {
                document_name: r.metadata.file_name.clone(),
                page_number: if r.metadata.page_number.is_finite() {
                    r.metadata.page_number.max(0.0) as u32
                } else {
                    0
                },
                excerpt: r.document.clone(),
            })
            .collect()
    }
}

/// Distinct `{{name}}` placeholders in a deployment config, first seen first.
///
/// Only the `messages` of the config are scanned when present; otherwise the
/// whole document is.
pub fn declared_variables(config: &serde_json::Value) -> Vec<String> {
    let root = config.get("messages").unwrap_or(config);
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    collect_placeholders(root, &mut seen, &mut names);
    names
}

fn collect_placeholders(value: &serde_json::Value, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            for cap in PLACEHOLDER.captures_iter(s) {
                let name = cap[1].to_string();
                if seen.insert(name.clone()) {
                    out.push(name);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_placeholders(item, seen, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_placeholders(item, seen, out);
            }
        }
        _ => {}
    }
}
