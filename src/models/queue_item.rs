use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Syncing => "syncing",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "syncing" => Ok(QueueStatus::Syncing),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("Unknown queue status: {other}")),
        }
    }
}

/// A bookmark waiting to be created on the remote API.
///
/// Rows only ever exist while undelivered: a successful delivery deletes the row.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub url: String,
    pub status: QueueStatus,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a queue item. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct QueueItemUpdate {
    pub status: Option<QueueStatus>,
    pub retry_count: Option<i64>,
    pub last_error: Option<String>,
}

impl QueueItemUpdate {
    pub fn status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(QueueStatus::Failed),
            last_error: Some(error.into()),
            ..Default::default()
        }
    }
}
