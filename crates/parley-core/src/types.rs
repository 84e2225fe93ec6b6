use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of deployment a page drives.
///
/// Both variants run through the same orchestrator; the variant only decides
/// whether template variables and staged images take part in a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentVariant {
    /// Plain tutor: no variables, no images.
    #[default]
    Tutor,
    /// Exam checker: requires every declared variable and accepts an image.
    ExamChecker,
}

impl DeploymentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentVariant::Tutor => "tutor",
            DeploymentVariant::ExamChecker => "exam_checker",
        }
    }

    /// Whether the deployment's declared variables must be bound before a send.
    pub fn requires_variables(&self) -> bool {
        matches!(self, DeploymentVariant::ExamChecker)
    }

    /// Whether an image can be staged for the next turn.
    pub fn accepts_images(&self) -> bool {
        matches!(self, DeploymentVariant::ExamChecker)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One block of message content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// A data URI or remote image reference.
    ImageRef { url: String },
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::ImageRef { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::ImageRef { .. })
    }
}

/// One entry of the conversation transcript.
///
/// Constructed only through the role-specific constructors so that a
/// persisted message always carries at least one content block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// A user message carrying a single text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// A user message carrying a single image reference.
    pub fn user_image(url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ImageRef { url: url.into() }],
        }
    }

    /// An assistant reply.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Text blocks of this message, in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(ContentBlock::as_text)
    }

    pub fn has_image(&self) -> bool {
        self.content.iter().any(ContentBlock::is_image)
    }
}

// =============================================================================
// Citations
// =============================================================================

/// A retrieval source returned alongside a generated reply.
///
/// Citations are display state for the turn that produced them and are never
/// stored in the transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub document_name: String,
    #[serde(deserialize_with = "deserialize_page_number")]
    pub page_number: u32,
    pub excerpt: String,
}

/// Page numbers arrive as either integers or floats (`3.0`).
fn deserialize_page_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "page number out of range: {value}"
        )));
    }
    Ok(value as u32)
}
