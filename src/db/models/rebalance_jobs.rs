use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Audit-record status; progression is pending -> executing -> (completed | failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Executing => "executing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, FromRow)]
pub struct RebalanceJobModel {
    pub id: i32,
    pub portfolio_id: i32,
    pub status: String,
    pub policy: String,
    pub max_deviation: Option<Decimal>,
    pub swaps: Option<String>,
    pub tx_hashes: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewRebalanceJobModel {
    pub portfolio_id: i32,
    pub policy: String,
    pub max_deviation: Decimal,
    pub swaps: String, // JSON snapshot of the ordered swap list
}
