//! Payment receipts attached to submissions.
//!
//! Clients upload the file as base64. The stored form is a data URL so the
//! admin review can render it directly.

use crate::rejection::{Field, Rejection};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Receipt as sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptUpload {
    pub file_name: String,
    pub content_type: String,
    /// Base64 encoded file content.
    pub data: String,
}

/// Receipt ready to be stored with a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub file_name: String,
    pub encoded: String,
}

fn accepted_content_type(content_type: &str, file_name: &str) -> Option<String> {
    let content_type = content_type.trim().to_ascii_lowercase();
    if content_type.starts_with("image/") || content_type == PDF_CONTENT_TYPE {
        Some(content_type)
    } else if file_name.to_ascii_lowercase().ends_with(".pdf") {
        Some(PDF_CONTENT_TYPE.to_owned())
    } else {
        None
    }
}

impl Receipt {
    pub fn from_bytes(file_name: &str, content_type: &str, bytes: &[u8]) -> Result<Self, Rejection> {
        if file_name.trim().is_empty() {
            return Err(Rejection::Missing(Field::Receipt));
        }
        if bytes.len() > MAX_RECEIPT_BYTES {
            return Err(Rejection::ReceiptTooLarge {
                size: bytes.len(),
                limit: MAX_RECEIPT_BYTES,
            });
        }
        let content_type = accepted_content_type(content_type, file_name)
            .ok_or_else(|| Rejection::UnsupportedReceipt(content_type.to_owned()))?;
        debug!(
            file_name,
            size = bytes.len(),
            content_type = content_type.as_str(),
            "Encoding receipt"
        );
        Ok(Self {
            file_name: file_name.to_owned(),
            encoded: format!("data:{};base64,{}", content_type, STANDARD.encode(bytes)),
        })
    }

    /// A missing upload is rejected like an empty file input.
    pub fn from_upload(upload: Option<&ReceiptUpload>) -> Result<Self, Rejection> {
        let upload = upload.ok_or(Rejection::Missing(Field::Receipt))?;
        let bytes = STANDARD
            .decode(upload.data.trim())
            .map_err(|err| Rejection::MalformedReceipt(err.to_string()))?;
        Self::from_bytes(&upload.file_name, &upload.content_type, &bytes)
    }
}
