//! Advisory lease coordinating store access across instances.
//!
//! The store file is shared by every instance of the application. A single
//! lease row records who currently holds the store. An open that finds a
//! live foreign lease fails with a blocked error and flags the holder; the
//! holder is expected to poll [`release_requested`] and close so the next
//! open (typically one carrying a schema upgrade) starts fresh. Leases
//! expire after a TTL so a crashed holder never wedges the store.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::time;

/// How long a lease stays valid without renewal.
pub const LEASE_TTL_SECONDS: i64 = 30;

/// Snapshot of the lease row.
#[derive(Debug, Clone)]
pub struct Lease {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub release_requested: bool,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub(crate) fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS store_lease (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            release_requested INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    Ok(())
}

/// Read the current lease row, if any.
pub(crate) fn current(conn: &Connection) -> Result<Option<Lease>> {
    conn.query_row(
        "SELECT holder, acquired_at, expires_at, release_requested FROM store_lease WHERE id = 1",
        [],
        |row| {
            Ok(Lease {
                holder: row.get(0)?,
                acquired_at: time::from_sql(1, row.get::<_, String>(1)?)?,
                expires_at: time::from_sql(2, row.get::<_, String>(2)?)?,
                release_requested: row.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Try to take the lease for `holder`.
///
/// Succeeds when the row is absent, expired, or already ours. A live foreign
/// lease is flagged with a release request and surfaces as
/// [`StoreError::Blocked`] so the caller can retry after the holder yields.
pub(crate) fn acquire(conn: &Connection, holder: &str, now: DateTime<Utc>) -> Result<Lease> {
    if let Some(existing) = current(conn)? {
        if existing.holder != holder && !existing.is_expired(now) {
            conn.execute(
                "UPDATE store_lease SET release_requested = 1 WHERE id = 1",
                [],
            )?;
            tracing::debug!(holder = %existing.holder, "store lease held elsewhere, release requested");
            return Err(StoreError::Blocked {
                holder: existing.holder,
            });
        }
    }

    let lease = Lease {
        holder: holder.to_string(),
        acquired_at: now,
        expires_at: now + Duration::seconds(LEASE_TTL_SECONDS),
        release_requested: false,
    };
    conn.execute(
        "INSERT OR REPLACE INTO store_lease (id, holder, acquired_at, expires_at, release_requested)
         VALUES (1, ?1, ?2, ?3, 0)",
        params![
            lease.holder,
            time::to_sql(&lease.acquired_at),
            time::to_sql(&lease.expires_at)
        ],
    )?;
    Ok(lease)
}

/// Extend our lease. Fails with [`StoreError::Connection`] when the lease
/// was lost to another instance in the meantime.
pub(crate) fn renew(conn: &Connection, holder: &str, now: DateTime<Utc>) -> Result<Lease> {
    match current(conn)? {
        Some(existing) if existing.holder == holder => {
            let expires_at = now + Duration::seconds(LEASE_TTL_SECONDS);
            conn.execute(
                "UPDATE store_lease SET expires_at = ?1 WHERE id = 1 AND holder = ?2",
                params![time::to_sql(&expires_at), holder],
            )?;
            Ok(Lease {
                expires_at,
                ..existing
            })
        }
        Some(existing) => Err(StoreError::Connection(format!(
            "lease lost to {}",
            existing.holder
        ))),
        None => Err(StoreError::Connection("lease released".to_string())),
    }
}

/// Whether another instance has asked this holder to release.
pub(crate) fn release_requested(conn: &Connection, holder: &str) -> Result<bool> {
    let flag: Option<i64> = conn
        .query_row(
            "SELECT release_requested FROM store_lease WHERE id = 1 AND holder = ?1",
            params![holder],
            |row| row.get(0),
        )
        .optional()?;
    Ok(flag.unwrap_or(0) != 0)
}

/// Drop our lease row. A no-op when the lease moved on already.
pub(crate) fn release(conn: &Connection, holder: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM store_lease WHERE id = 1 AND holder = ?1",
        params![holder],
    )?;
    Ok(())
}
