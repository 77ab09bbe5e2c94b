use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A persisted object count for an area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub object_type: String,
    pub count: i32,
    pub area_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalyticsRecord {
    pub object_type: String,
    pub count: i32,
    pub area_name: String,
}

impl NewAnalyticsRecord {
    pub fn validate(&self) -> Result<()> {
        if self.object_type.trim().is_empty() {
            return Err(Error::InvalidInput("object_type must not be empty".to_string()));
        }
        if self.count < 0 {
            return Err(Error::InvalidInput("count must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Offset pagination for analytics listings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsQuery {
    pub skip: i64,
    pub limit: i64,
}

impl AnalyticsQuery {
    pub const MAX_LIMIT: i64 = 1000;

    /// Clamp to sane bounds
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            skip: self.skip.max(0),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for AnalyticsQuery {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}
