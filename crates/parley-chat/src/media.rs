//! Document and image uploads accepted by the chat.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ChatError;

/// Document formats the deployment's retrieval pipeline can convert.
const DOCUMENT_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("csv", "text/csv"),
    ("xls", "application/vnd.ms-excel"),
];

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

fn lookup_mime(file_name: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    table.iter().find(|(e, _)| *e == ext).map(|(_, mime)| *mime)
}

/// A document waiting to be converted into a file reference.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ChatError> {
        let file_name = file_name.into();
        let mime = lookup_mime(&file_name, DOCUMENT_TYPES).ok_or_else(|| {
            ChatError::UnsupportedUpload(format!(
                "{file_name}: expected one of pdf, txt, docx, csv, xls"
            ))
        })?;
        if bytes.is_empty() {
            return Err(ChatError::UnsupportedUpload(format!("{file_name} is empty")));
        }
        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }
}

impl std::fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// An image encoded as a `data:` URI, ready to ride along with the next turn.
#[derive(Clone, PartialEq, Eq)]
pub struct StagedImage {
    data_uri: String,
}

impl StagedImage {
    /// Encode raw PNG/JPEG bytes, rejecting anything above `max_bytes`.
    pub fn from_bytes(file_name: &str, bytes: &[u8], max_bytes: usize) -> Result<Self, ChatError> {
        let mime = lookup_mime(file_name, IMAGE_TYPES).ok_or_else(|| {
            ChatError::UnsupportedUpload(format!("{file_name}: expected a PNG or JPEG image"))
        })?;
        if bytes.is_empty() {
            return Err(ChatError::UnsupportedUpload(format!("{file_name} is empty")));
        }
        if bytes.len() > max_bytes {
            return Err(ChatError::PayloadTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(Self {
            data_uri: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
        })
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn into_data_uri(self) -> String {
        self.data_uri
    }
}

impl std::fmt::Debug for StagedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = self.data_uri.split(',').next().unwrap_or_default();
        f.debug_struct("StagedImage")
            .field("prefix", &prefix)
            .field("len", &self.data_uri.len())
            .finish()
    }
}
