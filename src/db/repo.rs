use crate::model::{
    Criteria, MealPeriod, NewSubscription, ResourceRef, Subscription, SubscriptionStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid subscription: {0}")]
    Validation(&'static str),
    #[error("corrupt subscription row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Validate and persist a new watch request. Nothing is written when
/// validation fails.
#[instrument(skip_all)]
pub async fn add_subscription(pool: &Pool, new: &NewSubscription) -> Result<Uuid, StoreError> {
    new.validate(Utc::now().date_naive())
        .map_err(StoreError::Validation)?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO subscriptions \
         (id, owner, venue_id, venue_name, location_id, location_name, \
          party_size, target_date, meal_period, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(&new.owner)
    .bind(&new.resource.venue_id)
    .bind(&new.venue_name)
    .bind(&new.resource.location_id)
    .bind(&new.location_name)
    .bind(new.criteria.party_size as i64)
    .bind(new.criteria.date)
    .bind(new.criteria.meal_period.as_str())
    .bind(SubscriptionStatus::Active.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}

/// Snapshot of all Active subscriptions in creation order. Writers racing
/// this read are picked up next cycle, not mid-iteration.
#[instrument(skip_all)]
pub async fn active_subscriptions(pool: &Pool) -> Result<Vec<Subscription>, StoreError> {
    let rows = sqlx::query(
        "SELECT * FROM subscriptions WHERE status = ? ORDER BY created_at, id",
    )
    .bind(SubscriptionStatus::Active.as_str())
    .fetch_all(pool)
    .await?;
    rows.iter().map(subscription_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_subscription(pool: &Pool, id: Uuid) -> Result<Option<Subscription>, StoreError> {
    let row = sqlx::query("SELECT * FROM subscriptions WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(subscription_from_row).transpose()
}

/// All subscriptions for one requester, any status, in creation order.
#[instrument(skip_all)]
pub async fn subscriptions_for_owner(
    pool: &Pool,
    owner: &str,
) -> Result<Vec<Subscription>, StoreError> {
    let rows = sqlx::query("SELECT * FROM subscriptions WHERE owner = ? ORDER BY created_at, id")
        .bind(owner)
        .fetch_all(pool)
        .await?;
    rows.iter().map(subscription_from_row).collect()
}

/// Flip an Active subscription to Resolved. Idempotent: returns `false`
/// without error when the row is already Resolved.
#[instrument(skip_all)]
pub async fn mark_resolved(
    pool: &Pool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let res = sqlx::query(
        "UPDATE subscriptions SET status = ?, resolved_at = ? WHERE id = ? AND status = ?",
    )
    .bind(SubscriptionStatus::Resolved.as_str())
    .bind(now)
    .bind(id.to_string())
    .bind(SubscriptionStatus::Active.as_str())
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Record a poll attempt, success or failure.
#[instrument(skip_all)]
pub async fn touch_checked(pool: &Pool, id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
    sqlx::query("UPDATE subscriptions SET last_checked_at = ? WHERE id = ?")
        .bind(now)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, StoreError> {
    let raw_id: String = row.get("id");
    let id = Uuid::parse_str(&raw_id)
        .map_err(|err| StoreError::Corrupt(format!("id '{raw_id}': {err}")))?;

    let raw_status: String = row.get("status");
    let status = SubscriptionStatus::parse(&raw_status)
        .ok_or_else(|| StoreError::Corrupt(format!("status '{raw_status}'")))?;

    let raw_meal: String = row.get("meal_period");
    let meal_period = raw_meal
        .parse::<MealPeriod>()
        .map_err(|_| StoreError::Corrupt(format!("meal_period '{raw_meal}'")))?;

    Ok(Subscription {
        id,
        owner: row.get("owner"),
        resource: ResourceRef {
            venue_id: row.get("venue_id"),
            location_id: row.get("location_id"),
        },
        venue_name: row.get("venue_name"),
        location_name: row.get("location_name"),
        criteria: Criteria {
            party_size: row.get::<i64, _>("party_size") as u32,
            date: row.get("target_date"),
            meal_period,
        },
        status,
        created_at: row.get("created_at"),
        last_checked_at: row.get("last_checked_at"),
        resolved_at: row.get("resolved_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    async fn setup_pool() -> Pool {
        // One connection: pooled in-memory databases are per-connection.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn new_subscription(owner: &str) -> NewSubscription {
        NewSubscription {
            owner: owner.to_string(),
            resource: ResourceRef {
                venue_id: "venue-1".into(),
                location_id: "loc-1".into(),
            },
            venue_name: "Chez Test".into(),
            location_name: "Lakeside".into(),
            criteria: Criteria {
                party_size: 4,
                date: Utc::now().date_naive() + Days::new(30),
                meal_period: MealPeriod::Dinner,
            },
        }
    }

    #[tokio::test]
    async fn add_and_read_back() {
        let pool = setup_pool().await;
        let id = add_subscription(&pool, &new_subscription("1001"))
            .await
            .unwrap();

        let sub = get_subscription(&pool, id).await.unwrap().unwrap();
        assert_eq!(sub.id, id);
        assert_eq!(sub.owner, "1001");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.criteria.party_size, 4);
        assert_eq!(sub.criteria.meal_period, MealPeriod::Dinner);
        assert!(sub.last_checked_at.is_none());
        assert!(sub.resolved_at.is_none());

        let active = active_subscriptions(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
    }

    #[tokio::test]
    async fn validation_failure_persists_nothing() {
        let pool = setup_pool().await;

        let mut bad = new_subscription("1001");
        bad.criteria.party_size = 0;
        let err = add_subscription(&pool, &bad).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let mut bad = new_subscription("1001");
        bad.criteria.date = Utc::now().date_naive() - Days::new(1);
        assert!(matches!(
            add_subscription(&pool, &bad).await,
            Err(StoreError::Validation(_))
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn mark_resolved_is_idempotent() {
        let pool = setup_pool().await;
        let id = add_subscription(&pool, &new_subscription("1001"))
            .await
            .unwrap();

        assert!(mark_resolved(&pool, id, Utc::now()).await.unwrap());
        let sub = get_subscription(&pool, id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Resolved);
        assert!(sub.resolved_at.is_some());

        // Second call is a no-op, not an error.
        assert!(!mark_resolved(&pool, id, Utc::now()).await.unwrap());

        assert!(active_subscriptions(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn touch_checked_updates_timestamp_only() {
        let pool = setup_pool().await;
        let id = add_subscription(&pool, &new_subscription("1001"))
            .await
            .unwrap();

        let stamp = Utc::now();
        touch_checked(&pool, id, stamp).await.unwrap();

        let sub = get_subscription(&pool, id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        let recorded = sub.last_checked_at.expect("last_checked_at set");
        assert!((recorded - stamp).num_seconds().abs() < 2);
    }

    #[tokio::test]
    async fn owner_listing_includes_resolved() {
        let pool = setup_pool().await;
        let first = add_subscription(&pool, &new_subscription("1001"))
            .await
            .unwrap();
        let _second = add_subscription(&pool, &new_subscription("1001"))
            .await
            .unwrap();
        let _other = add_subscription(&pool, &new_subscription("2002"))
            .await
            .unwrap();

        mark_resolved(&pool, first, Utc::now()).await.unwrap();

        let mine = subscriptions_for_owner(&pool, "1001").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, first);
        assert_eq!(mine[0].status, SubscriptionStatus::Resolved);

        let active = active_subscriptions(&pool).await.unwrap();
        assert_eq!(active.len(), 2);
    }
}
