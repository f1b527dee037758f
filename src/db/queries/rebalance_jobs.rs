use chrono::{DateTime, Utc};
use sqlx::{Error, PgPool};

use crate::db::models::rebalance_jobs::{JobStatus, NewRebalanceJobModel, RebalanceJobModel};

const JOB_COLUMNS: &str = "id, portfolio_id, status, policy, max_deviation, swaps, tx_hashes, \
     error_message, created_at, started_at, finished_at";

/// Insert a pending job with its swap snapshot, returning its ID
pub async fn insert(pool: &PgPool, job: &NewRebalanceJobModel) -> Result<i32, Error> {
    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO rebalance_jobs (portfolio_id, status, policy, max_deviation, swaps)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(job.portfolio_id)
    .bind(JobStatus::Pending.as_str())
    .bind(&job.policy)
    .bind(job.max_deviation)
    .bind(&job.swaps)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn mark_executing(pool: &PgPool, id: i32, started_at: DateTime<Utc>) -> Result<(), Error> {
    sqlx::query("UPDATE rebalance_jobs SET status = $2, started_at = $3 WHERE id = $1")
        .bind(id)
        .bind(JobStatus::Executing.as_str())
        .bind(started_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_completed(
    pool: &PgPool,
    id: i32,
    tx_hashes: &str,
    finished_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        UPDATE rebalance_jobs
        SET status = $2, tx_hashes = $3, finished_at = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(JobStatus::Completed.as_str())
    .bind(tx_hashes)
    .bind(finished_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    id: i32,
    tx_hashes: &str,
    error_message: &str,
    finished_at: DateTime<Utc>,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        UPDATE rebalance_jobs
        SET status = $2, tx_hashes = $3, error_message = $4, finished_at = $5
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(JobStatus::Failed.as_str())
    .bind(tx_hashes)
    .bind(error_message)
    .bind(finished_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent job for a portfolio, newest first
pub async fn latest_for_portfolio(
    pool: &PgPool,
    portfolio_id: i32,
) -> Result<Option<RebalanceJobModel>, Error> {
    sqlx::query_as::<_, RebalanceJobModel>(&format!(
        "SELECT {} FROM rebalance_jobs WHERE portfolio_id = $1 ORDER BY created_at DESC LIMIT 1",
        JOB_COLUMNS
    ))
    .bind(portfolio_id)
    .fetch_optional(pool)
    .await
}
