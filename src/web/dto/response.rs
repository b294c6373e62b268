//! Response DTOs for the API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{Headers, Message, MessageId, MimePart};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    /// Response data.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    /// Create a new paginated response.
    pub fn new(data: Vec<T>, page: u32, per_page: u32, total: u64) -> Self {
        Self {
            data,
            meta: PaginationMeta {
                page,
                per_page,
                total,
            },
        }
    }
}

/// Pagination metadata.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of matching items.
    pub total: u64,
}

/// A leaf MIME part without its content.
#[derive(Debug, Serialize)]
pub struct PartInfo {
    /// Index to download the part with.
    pub index: usize,
    /// MIME type.
    pub content_type: String,
    /// Attachment filename.
    pub filename: Option<String>,
    /// Decoded size in bytes.
    pub size: usize,
    /// Decoded text for `text/*` parts.
    pub text: Option<String>,
}

impl From<MimePart> for PartInfo {
    fn from(part: MimePart) -> Self {
        Self {
            index: part.index,
            content_type: part.content_type,
            filename: part.filename,
            size: part.size,
            text: part.text,
        }
    }
}

/// Full view of one message.
#[derive(Debug, Serialize)]
pub struct MessageDetailResponse {
    /// Message ID.
    pub id: MessageId,
    /// Envelope sender (empty for the null sender).
    pub from: String,
    /// Envelope recipients.
    pub to: Vec<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From header.
    pub header_from: Option<String>,
    /// To header values.
    pub header_to: Vec<String>,
    /// All headers by canonical name.
    pub headers: Headers,
    /// Body as text; invalid UTF-8 is replaced.
    pub body: String,
    /// Raw size in bytes.
    pub size: usize,
    /// Time the message was received.
    pub received_at: DateTime<Utc>,
    /// Leaf MIME parts; empty when the MIME structure cannot be parsed.
    pub parts: Vec<PartInfo>,
}

impl From<&Message> for MessageDetailResponse {
    fn from(message: &Message) -> Self {
        let parts = match message.mime_parts() {
            Ok(parts) => parts.into_iter().map(PartInfo::from).collect(),
            Err(e) => {
                tracing::debug!(id = %message.id, "No MIME parts: {}", e);
                Vec::new()
            }
        };

        Self {
            id: message.id,
            from: message.from.clone(),
            to: message.to.clone(),
            subject: message.subject().map(str::to_string),
            header_from: message.headers.get("From").map(str::to_string),
            header_to: message.headers.get_all("To").to_vec(),
            headers: message.headers.clone(),
            body: String::from_utf8_lossy(message.body()).into_owned(),
            size: message.size,
            received_at: message.received_at,
            parts,
        }
    }
}
