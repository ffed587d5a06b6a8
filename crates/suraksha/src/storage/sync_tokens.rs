//! Idempotency token bookkeeping for the sync reconciler.
//!
//! Tokens are scoped to the subject that submitted them. A token is claimed
//! before its operation is applied. On success the claim is completed with
//! the created record's ID; on failure it is released so a later retry can
//! apply the operation. A claim that is never settled becomes reclaimable
//! once it is older than the caller's staleness cutoff.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::{to_db_time, Storage};
use crate::error::Result;

/// State of a claimed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClaim {
    /// The caller now owns the token and should apply the operation.
    Claimed,
    /// The token was already applied, producing this record.
    Applied(i64),
    /// Another attempt holds a recent claim that has not settled yet.
    InFlight,
}

impl Storage {
    /// Claim `token` for an operation submitted by `subject_id`.
    ///
    /// An unsettled claim made before `stale_before` is taken over by this
    /// call.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn claim_sync_token(
        &self,
        subject_id: i64,
        token: &str,
        op_type: &str,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<TokenClaim> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r"
            INSERT OR IGNORE INTO sync_tokens (subject_id, token, op_type, claimed_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![subject_id, token, op_type, to_db_time(&claimed_at)],
        )?;
        if inserted > 0 {
            return Ok(TokenClaim::Claimed);
        }

        let reclaimed = conn.execute(
            r"
            UPDATE sync_tokens SET op_type = ?3, claimed_at = ?4
            WHERE subject_id = ?1 AND token = ?2
              AND record_id IS NULL AND claimed_at < ?5
            ",
            params![
                subject_id,
                token,
                op_type,
                to_db_time(&claimed_at),
                to_db_time(&stale_before)
            ],
        )?;
        if reclaimed > 0 {
            warn!(subject_id, token, "Reclaimed stale idempotency token");
            return Ok(TokenClaim::Claimed);
        }

        let record_id: Option<i64> = conn
            .query_row(
                "SELECT record_id FROM sync_tokens WHERE subject_id = ?1 AND token = ?2",
                params![subject_id, token],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(record_id.map_or(TokenClaim::InFlight, TokenClaim::Applied))
    }

    /// Record the ID produced by applying a claimed token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn complete_sync_token(&self, subject_id: i64, token: &str, record_id: i64) -> Result<()> {
        self.conn()?.execute(
            "UPDATE sync_tokens SET record_id = ?1 WHERE subject_id = ?2 AND token = ?3",
            params![record_id, subject_id, token],
        )?;
        Ok(())
    }

    /// Drop a claim whose operation failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn release_sync_token(&self, subject_id: i64, token: &str) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM sync_tokens WHERE subject_id = ?1 AND token = ?2 AND record_id IS NULL",
            params![subject_id, token],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claim(storage: &Storage, subject_id: i64, token: &str, at: DateTime<Utc>) -> TokenClaim {
        storage
            .claim_sync_token(
                subject_id,
                token,
                "alert-trigger",
                at,
                at - Duration::minutes(5),
            )
            .unwrap()
    }

    #[test]
    fn test_claim_complete_and_replay() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        assert_eq!(claim(&storage, 1, "tok-1", now), TokenClaim::Claimed);
        storage.complete_sync_token(1, "tok-1", 42).unwrap();
        assert_eq!(claim(&storage, 1, "tok-1", now), TokenClaim::Applied(42));
    }

    #[test]
    fn test_released_token_can_be_claimed_again() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        claim(&storage, 1, "tok-2", now);
        storage.release_sync_token(1, "tok-2").unwrap();
        assert_eq!(claim(&storage, 1, "tok-2", now), TokenClaim::Claimed);
    }

    #[test]
    fn test_tokens_are_scoped_per_subject() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        assert_eq!(claim(&storage, 5, "1", now), TokenClaim::Claimed);
        storage.complete_sync_token(5, "1", 10).unwrap();

        assert_eq!(claim(&storage, 6, "1", now), TokenClaim::Claimed);
        storage.complete_sync_token(6, "1", 11).unwrap();

        assert_eq!(claim(&storage, 5, "1", now), TokenClaim::Applied(10));
        assert_eq!(claim(&storage, 6, "1", now), TokenClaim::Applied(11));
    }

    #[test]
    fn test_unsettled_claim_is_in_flight() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        claim(&storage, 1, "tok-3", now);
        assert_eq!(
            claim(&storage, 1, "tok-3", now + Duration::seconds(1)),
            TokenClaim::InFlight
        );
    }

    #[test]
    fn test_stale_claim_is_reclaimed() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        claim(&storage, 1, "tok-4", now - Duration::hours(1));
        assert_eq!(claim(&storage, 1, "tok-4", now), TokenClaim::Claimed);
        // The takeover refreshed the claim time
        assert_eq!(
            claim(&storage, 1, "tok-4", now + Duration::seconds(1)),
            TokenClaim::InFlight
        );
    }

    #[test]
    fn test_release_keeps_completed_token() {
        let storage = Storage::open_in_memory().unwrap();
        let now = Utc::now();

        claim(&storage, 1, "tok-5", now);
        storage.complete_sync_token(1, "tok-5", 7).unwrap();
        storage.release_sync_token(1, "tok-5").unwrap();
        assert_eq!(claim(&storage, 1, "tok-5", now), TokenClaim::Applied(7));
    }
}
