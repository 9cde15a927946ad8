pub mod client;

use serde::{Deserialize, Serialize};

pub const TITLE_MIN_LENGTH: usize = 5;
pub const DESCRIPTION_MIN_LENGTH: usize = 10;
pub const MAX_TAGS: usize = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TicketCategory {
    #[serde(rename = "AI")]
    Ai,
    Podcast,
    Education,
    Programming,
    Science,
    Math,
    Other,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 7] = [
        TicketCategory::Ai,
        TicketCategory::Podcast,
        TicketCategory::Education,
        TicketCategory::Programming,
        TicketCategory::Science,
        TicketCategory::Math,
        TicketCategory::Other,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Kept as text: the backend substitutes a placeholder for unknown
    /// categories instead of rejecting the record.
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TicketCreate {
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl TicketCreate {
    /// Client-side checks mirroring the backend's rules.
    pub fn validate(&self) -> Result<(), TicketError> {
        if self.title.trim().chars().count() < TITLE_MIN_LENGTH {
            return Err(TicketError::Validation(format!(
                "Title must be at least {TITLE_MIN_LENGTH} characters"
            )));
        }
        if self.description.trim().chars().count() < DESCRIPTION_MIN_LENGTH {
            return Err(TicketError::Validation(format!(
                "Description must be at least {DESCRIPTION_MIN_LENGTH} characters"
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(TicketError::Validation(format!(
                "At most {MAX_TAGS} tags are allowed"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("{0}")]
    Validation(String),
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Request timeout. Please try again.")]
    Timeout,
}
