//! Durable bid storage.

pub mod sqlite;

#[cfg(test)]
mod tests;

pub use sqlite::{BidStore, BidStoreConfig, SqlitePath};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimate::{LineItem, RoomDimensions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Draft,
    Generated,
    Sent,
    Accepted,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Draft => "draft",
            BidStatus::Generated => "generated",
            BidStatus::Sent => "sent",
            BidStatus::Accepted => "accepted",
        }
    }

    pub(crate) fn from_db(value: &str) -> Self {
        match value {
            "draft" => BidStatus::Draft,
            "sent" => BidStatus::Sent,
            "accepted" => BidStatus::Accepted,
            _ => BidStatus::Generated,
        }
    }
}

/// A bid as assembled on the client, before it has an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidDraft {
    pub user_id: String,
    pub client_id: Option<String>,
    pub project_name: String,
    pub address: Option<String>,
    pub dimensions: Option<RoomDimensions>,
    pub items: Vec<LineItem>,
    pub estimated_cost: f64,
    pub status: BidStatus,
}

impl BidDraft {
    /// Builds a draft whose estimated cost equals the sum of item totals.
    pub fn new(
        user_id: impl Into<String>,
        project_name: impl Into<String>,
        items: Vec<LineItem>,
    ) -> Self {
        let estimated_cost = items.iter().map(LineItem::total).sum();
        Self {
            user_id: user_id.into(),
            client_id: None,
            project_name: project_name.into(),
            address: None,
            dimensions: None,
            items,
            estimated_cost,
            status: BidStatus::Generated,
        }
    }
}

/// A persisted bid with its generated identity and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub project_name: String,
    pub address: Option<String>,
    pub dimensions: Option<RoomDimensions>,
    pub items: Vec<LineItem>,
    pub estimated_cost: f64,
    pub status: BidStatus,
    pub created_at_ms: i64,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid bid: {reason}")]
    Validation { reason: String },
    #[error("bid {id} not found")]
    NotFound { id: String },
    #[error("bid storage failed: {source}")]
    Storage {
        #[from]
        source: anyhow::Error,
    },
}

impl PersistenceError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        PersistenceError::Validation {
            reason: reason.into(),
        }
    }

    /// HTTP-style status for the persistence endpoint boundary: client
    /// validation errors map to 4xx, storage failures to 5xx.
    pub fn status_code(&self) -> u16 {
        match self {
            PersistenceError::Validation { .. } => 400,
            PersistenceError::NotFound { .. } => 404,
            PersistenceError::Storage { .. } => 500,
        }
    }
}
