//! Request DTOs for the API.

use serde::Deserialize;
use validator::Validate;

use crate::release::OutgoingServer;
use crate::storage::SearchKind;

/// Largest page size the message listing returns.
pub const MAX_PER_PAGE: u32 = 250;

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Most recently received first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
}

/// Query parameters of `GET /api/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageListQuery {
    /// Page number, starting at 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Sender filter.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient filter.
    #[serde(default)]
    pub to: Option<String>,
    /// Content filter.
    #[serde(default)]
    pub containing: Option<String>,
    /// Listing order.
    #[serde(default)]
    pub order: ListOrder,
}

impl Default for MessageListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            from: None,
            to: None,
            containing: None,
            order: ListOrder::default(),
        }
    }
}

impl MessageListQuery {
    /// Page and page size after clamping to sane bounds.
    pub fn page_and_size(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PER_PAGE))
    }

    /// Offset and limit for the clamped page.
    pub fn to_offset_limit(&self) -> (usize, usize) {
        let (page, per_page) = self.page_and_size();
        (((page - 1) as usize) * per_page as usize, per_page as usize)
    }

    /// Non-empty filters as lowercase needles.
    pub fn filters(&self) -> Vec<(SearchKind, String)> {
        [
            (SearchKind::From, &self.from),
            (SearchKind::To, &self.to),
            (SearchKind::Containing, &self.containing),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (kind, v.to_lowercase()))
        })
        .collect()
    }
}

/// Body of `POST /api/messages/:id/release`.
///
/// Either `host` describes an ad-hoc target, or `name` alone refers to a
/// saved preset.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReleaseRequest {
    /// Preset name.
    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "Name must be 1-64 characters"))]
    pub name: Option<String>,
    /// Upstream host.
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "Host must be 1-255 characters"))]
    pub host: Option<String>,
    /// Upstream port, 25 when unset.
    #[serde(default)]
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: Option<u16>,
    /// Sole recipient replacing the stored recipients.
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    /// Username for authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// `PLAIN` or `LOGIN`.
    #[serde(default)]
    pub mechanism: Option<String>,
    /// Keep the target as a preset under `name`.
    #[serde(default)]
    pub save: bool,
}

impl ReleaseRequest {
    /// The ad-hoc target described by this request, if it names a host.
    pub fn target(&self) -> Option<OutgoingServer> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        Some(OutgoingServer {
            name: self.name.clone().unwrap_or_default(),
            username: self.username.clone(),
            password: self.password.clone(),
            mechanism: self.mechanism.clone(),
            email: self.email.clone(),
            save: self.save,
            ..OutgoingServer::new(host, self.port.unwrap_or(25))
        })
    }
}
