//! SQLite-backed persistence for the Memply engine.
//! One table per entity: members, blacklist, rate_control (one row per
//! calendar day), reminder_log (append-only).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use memply_core::config::RateConfig;
use memply_core::error::{MemplyError, Result};
use memply_core::types::{
    BlacklistEntry, DeliveryErrorKind, Member, MemberStatus, RateControlState, ReminderLogEntry,
    ReminderOutcome,
};

fn db_err(e: impl std::fmt::Display) -> MemplyError {
    MemplyError::Store(e.to_string())
}

/// Store handle. All engine components share one of these; the connection
/// mutex is what makes per-sub-batch rate updates read-count-then-write
/// safe.
pub struct MemberStore {
    conn: Mutex<Connection>,
}

impl MemberStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active',
                membership_name TEXT NOT NULL DEFAULT '',
                price_cents INTEGER NOT NULL DEFAULT 0,
                expiry_date TEXT NOT NULL,
                last_payment_date TEXT,
                inactive_since TEXT,
                auto_suspended INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_members_status_expiry
                ON members(status, expiry_date);

            -- One row per recipient with delivery-failure history.
            CREATE TABLE IF NOT EXISTS blacklist (
                email TEXT PRIMARY KEY,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL DEFAULT '',
                first_error_date TEXT NOT NULL,
                last_attempt_date TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 1,
                is_permanent INTEGER NOT NULL DEFAULT 0
            );

            -- One row per calendar day of send accounting.
            CREATE TABLE IF NOT EXISTS rate_control (
                day TEXT PRIMARY KEY,
                max_per_day INTEGER NOT NULL,
                max_per_batch INTEGER NOT NULL,
                batch_delay_minutes INTEGER NOT NULL,
                sent_today INTEGER NOT NULL DEFAULT 0,
                last_batch_time TEXT
            );

            -- Append-only audit log; also the already-reminded-today signal.
            CREATE TABLE IF NOT EXISTS reminder_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                member_id TEXT NOT NULL,
                email TEXT NOT NULL,
                email_type TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error TEXT,
                sent_on TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminder_log_daily
                ON reminder_log(member_id, email_type, sent_on);
            ",
        )
        .map_err(db_err)?;
        Ok(())
    }

    // ─── Members ──────────────────────────────────────

    /// Insert a new member.
    pub fn add_member(&self, member: &Member) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT INTO members
             (id, name, email, status, membership_name, price_cents, expiry_date,
              last_payment_date, inactive_since, auto_suspended, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                member.id,
                member.name,
                member.email,
                member.status.as_str(),
                member.membership_name,
                member.price_cents,
                member.expiry_date.to_string(),
                member.last_payment_date.map(|d| d.to_string()),
                member.inactive_since.map(|d| d.to_string()),
                member.auto_suspended as i32,
                member.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Fetch a member by ID.
    pub fn member_by_id(&self, id: &str) -> Result<Option<Member>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MEMBER_COLUMNS} FROM members m WHERE m.id = ?1"))
            .map_err(db_err)?;
        let member = stmt.query_row([id], row_to_member).ok();
        Ok(member)
    }

    /// All members, newest first.
    pub fn list_members(&self) -> Result<Vec<Member>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEMBER_COLUMNS} FROM members m ORDER BY m.created_at DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_member).map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Explicit member operations ──────────────────────────────────────
    // These are the external actions the state machine is not responsible
    // for. Payment and reactivation reset the automatic-transition
    // bookkeeping so the state machine starts over from active.

    /// Record a payment: back to active with a fresh entitlement period.
    pub fn record_payment(&self, id: &str, paid_on: NaiveDate, new_expiry: NaiveDate) -> Result<()> {
        let changed = self
            .conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members
                 SET status = 'active', last_payment_date = ?2, expiry_date = ?3,
                     inactive_since = NULL, auto_suspended = 0
                 WHERE id = ?1 AND status <> 'cancelled'",
                rusqlite::params![id, paid_on.to_string(), new_expiry.to_string()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(MemplyError::Store(format!("No payable member with id {id}")));
        }
        Ok(())
    }

    /// Manual suspension (not the automatic one — `auto_suspended` stays 0).
    pub fn suspend_member(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members SET status = 'suspended', auto_suspended = 0
                 WHERE id = ?1 AND status <> 'cancelled'",
                [id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Reactivate a suspended/expired member.
    pub fn reactivate_member(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members
                 SET status = 'active', inactive_since = NULL, auto_suspended = 0
                 WHERE id = ?1 AND status <> 'cancelled'",
                [id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Terminal cancellation. The state machine never touches these rows.
    pub fn cancel_member(&self, id: &str) -> Result<()> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute("UPDATE members SET status = 'cancelled' WHERE id = ?1", [id])
            .map_err(db_err)?;
        Ok(())
    }

    // ─── Lifecycle transitions ──────────────────────────────────────
    // Each is a one-way walk guarded by the source status, so re-running
    // with no time passing matches zero rows.

    /// active → expired for members whose expiry is older than the cutoff.
    /// Returns the number of rows transitioned.
    pub fn mark_expired(&self, cutoff: NaiveDate) -> Result<usize> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members SET status = 'expired'
                 WHERE status = 'active' AND expiry_date < ?1",
                [cutoff.to_string()],
            )
            .map_err(db_err)
    }

    /// expired → suspended once past the auto-suspend window. Stamps
    /// `inactive_since = expiry_date + auto_suspend_days`.
    pub fn auto_suspend(&self, cutoff: NaiveDate, auto_suspend_days: i64) -> Result<usize> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members
                 SET status = 'suspended', auto_suspended = 1,
                     inactive_since = date(expiry_date, '+' || ?2 || ' days')
                 WHERE status = 'expired' AND auto_suspended = 0 AND expiry_date < ?1",
                rusqlite::params![cutoff.to_string(), auto_suspend_days],
            )
            .map_err(db_err)
    }

    /// {suspended, expired} → inactive when the last payment is missing or
    /// older than the cutoff. `inactive_since` is set only when absent.
    pub fn mark_inactive(&self, payment_cutoff: NaiveDate, today: NaiveDate) -> Result<usize> {
        self.conn
            .lock()
            .map_err(db_err)?
            .execute(
                "UPDATE members
                 SET status = 'inactive',
                     inactive_since = COALESCE(inactive_since, ?2)
                 WHERE status IN ('suspended', 'expired')
                   AND (last_payment_date IS NULL OR last_payment_date < ?1)",
                rusqlite::params![payment_cutoff.to_string(), today.to_string()],
            )
            .map_err(db_err)
    }

    // ─── Eligibility ──────────────────────────────────────

    /// Active members expiring within [today, today + window] with no
    /// permanent blacklist entry for their address and no sent reminder of
    /// `email_type` logged today. Ordered most-urgent first.
    pub fn eligible_members(
        &self,
        today: NaiveDate,
        window_days: i64,
        email_type: &str,
    ) -> Result<Vec<Member>> {
        let horizon = today + Duration::days(window_days);
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEMBER_COLUMNS} FROM members m
                 WHERE m.status = 'active'
                   AND m.email <> ''
                   AND m.expiry_date >= ?1 AND m.expiry_date <= ?2
                   AND NOT EXISTS (
                       SELECT 1 FROM blacklist b
                       WHERE b.email = m.email AND b.is_permanent = 1)
                   AND NOT EXISTS (
                       SELECT 1 FROM reminder_log l
                       WHERE l.member_id = m.id AND l.email_type = ?3
                         AND l.outcome = 'sent' AND l.sent_on = ?1)
                 ORDER BY m.expiry_date ASC, m.name ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![today.to_string(), horizon.to_string(), email_type],
                row_to_member,
            )
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ─── Blacklist ──────────────────────────────────────

    /// Fetch the failure history for a recipient.
    pub fn blacklist_entry(&self, email: &str) -> Result<Option<BlacklistEntry>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT email, error_type, error_message, first_error_date,
                        last_attempt_date, attempt_count, is_permanent
                 FROM blacklist WHERE email = ?1",
            )
            .map_err(db_err)?;
        let entry = stmt
            .query_row([email], |row| {
                Ok(BlacklistEntry {
                    email: row.get(0)?,
                    error_type: DeliveryErrorKind::parse(&row.get::<_, String>(1)?),
                    error_message: row.get(2)?,
                    first_error_date: parse_ts(&row.get::<_, String>(3)?),
                    last_attempt_date: parse_ts(&row.get::<_, String>(4)?),
                    attempt_count: row.get(5)?,
                    is_permanent: row.get::<_, i32>(6)? != 0,
                })
            })
            .ok();
        Ok(entry)
    }

    /// Insert or replace a failure-history row. `is_permanent` is only
    /// ever written true-ward by the engine; enforce the ratchet here so a
    /// buggy caller cannot un-blacklist a recipient.
    pub fn upsert_blacklist(&self, entry: &BlacklistEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT INTO blacklist
             (email, error_type, error_message, first_error_date,
              last_attempt_date, attempt_count, is_permanent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(email) DO UPDATE SET
                 error_type = excluded.error_type,
                 error_message = excluded.error_message,
                 last_attempt_date = excluded.last_attempt_date,
                 attempt_count = excluded.attempt_count,
                 is_permanent = MAX(blacklist.is_permanent, excluded.is_permanent)",
            rusqlite::params![
                entry.email,
                entry.error_type.as_str(),
                entry.error_message,
                entry.first_error_date.to_rfc3339(),
                entry.last_attempt_date.to_rfc3339(),
                entry.attempt_count,
                entry.is_permanent as i32,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// All blacklist rows, most recently attempted first.
    pub fn list_blacklist(&self) -> Result<Vec<BlacklistEntry>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT email, error_type, error_message, first_error_date,
                        last_attempt_date, attempt_count, is_permanent
                 FROM blacklist ORDER BY last_attempt_date DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BlacklistEntry {
                    email: row.get(0)?,
                    error_type: DeliveryErrorKind::parse(&row.get::<_, String>(1)?),
                    error_message: row.get(2)?,
                    first_error_date: parse_ts(&row.get::<_, String>(3)?),
                    last_attempt_date: parse_ts(&row.get::<_, String>(4)?),
                    attempt_count: row.get(5)?,
                    is_permanent: row.get::<_, i32>(6)? != 0,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Number of permanently suppressed recipients.
    pub fn blacklisted_count(&self) -> Result<u32> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.query_row(
            "SELECT COUNT(*) FROM blacklist WHERE is_permanent = 1",
            [],
            |r| r.get(0),
        )
        .map_err(db_err)
    }

    /// Administrative unblock — the only path that clears a permanent
    /// entry, and it lives outside the engine proper.
    pub fn remove_blacklist_entry(&self, email: &str) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .map_err(db_err)?
            .execute("DELETE FROM blacklist WHERE email = ?1", [email])
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    // ─── Rate control ──────────────────────────────────────

    /// Today's accounting row, lazily created with limits seeded from
    /// config. Rows for past days are never mutated again.
    pub fn rate_state(&self, day: NaiveDate, limits: &RateConfig) -> Result<RateControlState> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO rate_control
             (day, max_per_day, max_per_batch, batch_delay_minutes, sent_today)
             VALUES (?1, ?2, ?3, ?4, 0)",
            rusqlite::params![
                day.to_string(),
                limits.max_per_day,
                limits.max_per_batch,
                limits.batch_delay_minutes,
            ],
        )
        .map_err(db_err)?;

        conn.query_row(
            "SELECT day, max_per_day, max_per_batch, batch_delay_minutes,
                    sent_today, last_batch_time
             FROM rate_control WHERE day = ?1",
            [day.to_string()],
            |row| {
                Ok(RateControlState {
                    day: parse_date(&row.get::<_, String>(0)?),
                    max_per_day: row.get(1)?,
                    max_per_batch: row.get(2)?,
                    batch_delay_minutes: row.get(3)?,
                    sent_today: row.get(4)?,
                    last_batch_time: row
                        .get::<_, Option<String>>(5)?
                        .map(|s| parse_ts(&s)),
                })
            },
        )
        .map_err(db_err)
    }

    /// Commit `n` successful sends against `day`: read the current count,
    /// add, write back, and stamp the batch time. Holding the connection
    /// lock across the read and write keeps the invariant
    /// `sent_today <= max_per_day` intact.
    pub fn record_sent(&self, day: NaiveDate, n: u32, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        let (sent, max): (u32, u32) = conn
            .query_row(
                "SELECT sent_today, max_per_day FROM rate_control WHERE day = ?1",
                [day.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(db_err)?;
        let updated = sent + n;
        if updated > max {
            return Err(MemplyError::Store(format!(
                "Rate accounting overflow: {updated} > {max} for {day}"
            )));
        }
        conn.execute(
            "UPDATE rate_control SET sent_today = ?2, last_batch_time = ?3 WHERE day = ?1",
            rusqlite::params![day.to_string(), updated, now.to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    // ─── Reminder log ──────────────────────────────────────

    /// Append an attempt record. Entries are immutable once written.
    pub fn append_log(&self, entry: &ReminderLogEntry) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute(
            "INSERT INTO reminder_log
             (member_id, email, email_type, outcome, error, sent_on, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                entry.member_id,
                entry.email,
                entry.email_type,
                entry.outcome.as_str(),
                entry.error,
                entry.sent_on.to_string(),
                entry.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Whether a `sent` entry of `email_type` exists for the member today.
    pub fn has_sent_today(&self, member_id: &str, email_type: &str, day: NaiveDate) -> Result<bool> {
        let conn = self.conn.lock().map_err(db_err)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reminder_log
                 WHERE member_id = ?1 AND email_type = ?2
                   AND outcome = 'sent' AND sent_on = ?3",
                rusqlite::params![member_id, email_type, day.to_string()],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Log entries for one member, newest first. Audit surface.
    pub fn log_for_member(&self, member_id: &str) -> Result<Vec<ReminderLogEntry>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT member_id, email, email_type, outcome, error, sent_on, created_at
                 FROM reminder_log WHERE member_id = ?1 ORDER BY id DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([member_id], |row| {
                Ok(ReminderLogEntry {
                    member_id: row.get(0)?,
                    email: row.get(1)?,
                    email_type: row.get(2)?,
                    outcome: ReminderOutcome::parse(&row.get::<_, String>(3)?),
                    error: row.get(4)?,
                    sent_on: parse_date(&row.get::<_, String>(5)?),
                    created_at: parse_ts(&row.get::<_, String>(6)?),
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

const MEMBER_COLUMNS: &str = "m.id, m.name, m.email, m.status, m.membership_name, m.price_cents, \
     m.expiry_date, m.last_payment_date, m.inactive_since, m.auto_suspended, m.created_at";

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        status: MemberStatus::parse(&row.get::<_, String>(3)?),
        membership_name: row.get(4)?,
        price_cents: row.get(5)?,
        expiry_date: parse_date(&row.get::<_, String>(6)?),
        last_payment_date: row.get::<_, Option<String>>(7)?.map(|s| parse_date(&s)),
        inactive_since: row.get::<_, Option<String>>(8)?.map(|s| parse_date(&s)),
        auto_suspended: row.get::<_, i32>(9)? != 0,
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

fn parse_date(s: &str) -> NaiveDate {
    s.parse().unwrap_or_else(|_| {
        tracing::warn!("Unparseable stored date {s:?}, substituting epoch");
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memply_core::types::MEMBERSHIP_REMINDER;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn member_expiring(name: &str, email: &str, expiry: NaiveDate) -> Member {
        Member::new(name, email, "Gold", 4900, expiry)
    }

    #[test]
    fn test_add_and_fetch_member() {
        let store = MemberStore::open_in_memory().unwrap();
        let member = member_expiring("Ada", "ada@example.com", date(2026, 3, 12));
        store.add_member(&member).unwrap();

        let loaded = store.member_by_id(&member.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Ada");
        assert_eq!(loaded.status, MemberStatus::Active);
        assert_eq!(loaded.expiry_date, date(2026, 3, 12));
        assert!(loaded.last_payment_date.is_none());
    }

    #[test]
    fn test_lifecycle_transitions_are_idempotent() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        // Expired 10 days ago: past grace (7), not yet past suspend (45).
        let member = member_expiring("Bob", "bob@example.com", today - Duration::days(10));
        store.add_member(&member).unwrap();

        let grace_cutoff = today - Duration::days(7);
        assert_eq!(store.mark_expired(grace_cutoff).unwrap(), 1);
        // Second pass with no time passing: nothing left to match.
        assert_eq!(store.mark_expired(grace_cutoff).unwrap(), 0);
        assert_eq!(
            store.member_by_id(&member.id).unwrap().unwrap().status,
            MemberStatus::Expired
        );
    }

    #[test]
    fn test_auto_suspend_stamps_inactive_since() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let expiry = today - Duration::days(50);
        let member = member_expiring("Cal", "cal@example.com", expiry);
        store.add_member(&member).unwrap();

        store.mark_expired(today - Duration::days(7)).unwrap();
        assert_eq!(store.auto_suspend(today - Duration::days(45), 45).unwrap(), 1);
        assert_eq!(store.auto_suspend(today - Duration::days(45), 45).unwrap(), 0);

        let loaded = store.member_by_id(&member.id).unwrap().unwrap();
        assert_eq!(loaded.status, MemberStatus::Suspended);
        assert!(loaded.auto_suspended);
        assert_eq!(loaded.inactive_since, Some(expiry + Duration::days(45)));
    }

    #[test]
    fn test_mark_inactive_preserves_existing_inactive_since() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let expiry = today - Duration::days(120);
        let member = member_expiring("Dee", "dee@example.com", expiry);
        store.add_member(&member).unwrap();

        store.mark_expired(today - Duration::days(7)).unwrap();
        store.auto_suspend(today - Duration::days(45), 45).unwrap();
        let stamped = store.member_by_id(&member.id).unwrap().unwrap().inactive_since;
        assert!(stamped.is_some());

        // No payment on record → inactive; the earlier stamp survives.
        assert_eq!(store.mark_inactive(today - Duration::days(90), today).unwrap(), 1);
        let loaded = store.member_by_id(&member.id).unwrap().unwrap();
        assert_eq!(loaded.status, MemberStatus::Inactive);
        assert_eq!(loaded.inactive_since, stamped);
    }

    #[test]
    fn test_payment_resets_lifecycle_bookkeeping() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let member = member_expiring("Eve", "eve@example.com", today - Duration::days(50));
        store.add_member(&member).unwrap();
        store.mark_expired(today - Duration::days(7)).unwrap();
        store.auto_suspend(today - Duration::days(45), 45).unwrap();

        store
            .record_payment(&member.id, today, today + Duration::days(30))
            .unwrap();
        let loaded = store.member_by_id(&member.id).unwrap().unwrap();
        assert_eq!(loaded.status, MemberStatus::Active);
        assert!(loaded.inactive_since.is_none());
        assert!(!loaded.auto_suspended);
        assert_eq!(loaded.last_payment_date, Some(today));
    }

    #[test]
    fn test_cancelled_members_are_untouchable() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let member = member_expiring("Fox", "fox@example.com", today - Duration::days(50));
        store.add_member(&member).unwrap();
        store.cancel_member(&member.id).unwrap();

        store.mark_expired(today - Duration::days(7)).unwrap();
        assert!(store.record_payment(&member.id, today, today).is_err());
        assert_eq!(
            store.member_by_id(&member.id).unwrap().unwrap().status,
            MemberStatus::Cancelled
        );
    }

    #[test]
    fn test_eligibility_ordering_and_exclusions() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);

        let soon = member_expiring("Zed", "zed@example.com", today + Duration::days(1));
        let later = member_expiring("Amy", "amy@example.com", today + Duration::days(3));
        let outside = member_expiring("Out", "out@example.com", today + Duration::days(10));
        let no_email = member_expiring("Nil", "", today + Duration::days(1));
        store.add_member(&soon).unwrap();
        store.add_member(&later).unwrap();
        store.add_member(&outside).unwrap();
        store.add_member(&no_email).unwrap();

        let picked = store.eligible_members(today, 3, MEMBERSHIP_REMINDER).unwrap();
        let names: Vec<&str> = picked.iter().map(|m| m.name.as_str()).collect();
        // Urgency first (expiry asc), name as tiebreak; window and empty
        // addresses excluded.
        assert_eq!(names, vec!["Zed", "Amy"]);
    }

    #[test]
    fn test_eligibility_excludes_blacklisted_and_already_sent() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let now = Utc::now();

        let blocked = member_expiring("Blk", "blk@example.com", today + Duration::days(1));
        let reminded = member_expiring("Rem", "rem@example.com", today + Duration::days(2));
        let fresh = member_expiring("New", "new@example.com", today + Duration::days(2));
        store.add_member(&blocked).unwrap();
        store.add_member(&reminded).unwrap();
        store.add_member(&fresh).unwrap();

        store
            .upsert_blacklist(&BlacklistEntry {
                email: "blk@example.com".into(),
                error_type: DeliveryErrorKind::InvalidAddress,
                error_message: "unknown address".into(),
                first_error_date: now,
                last_attempt_date: now,
                attempt_count: 1,
                is_permanent: true,
            })
            .unwrap();
        store
            .append_log(&ReminderLogEntry {
                member_id: reminded.id.clone(),
                email: reminded.email.clone(),
                email_type: MEMBERSHIP_REMINDER.into(),
                outcome: ReminderOutcome::Sent,
                error: None,
                sent_on: today,
                created_at: now,
            })
            .unwrap();

        let picked = store.eligible_members(today, 3, MEMBERSHIP_REMINDER).unwrap();
        let names: Vec<&str> = picked.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["New"]);
    }

    #[test]
    fn test_failed_log_does_not_block_reselection() {
        let store = MemberStore::open_in_memory().unwrap();
        let today = date(2026, 3, 10);
        let member = member_expiring("Try", "try@example.com", today + Duration::days(1));
        store.add_member(&member).unwrap();
        store
            .append_log(&ReminderLogEntry {
                member_id: member.id.clone(),
                email: member.email.clone(),
                email_type: MEMBERSHIP_REMINDER.into(),
                outcome: ReminderOutcome::Failed,
                error: Some("timeout".into()),
                sent_on: today,
                created_at: Utc::now(),
            })
            .unwrap();

        // Only sent entries suppress; a failed attempt leaves the member
        // selectable (the blacklist handles persistent failers).
        assert_eq!(store.eligible_members(today, 3, MEMBERSHIP_REMINDER).unwrap().len(), 1);
        assert!(!store.has_sent_today(&member.id, MEMBERSHIP_REMINDER, today).unwrap());
    }

    #[test]
    fn test_blacklist_ratchet_in_store() {
        let store = MemberStore::open_in_memory().unwrap();
        let now = Utc::now();
        let mut entry = BlacklistEntry {
            email: "x@example.com".into(),
            error_type: DeliveryErrorKind::Bounce,
            error_message: "hard bounce".into(),
            first_error_date: now,
            last_attempt_date: now,
            attempt_count: 1,
            is_permanent: true,
        };
        store.upsert_blacklist(&entry).unwrap();

        // A later transient write cannot clear the permanent bit.
        entry.error_type = DeliveryErrorKind::TemporaryFailure;
        entry.is_permanent = false;
        entry.attempt_count = 2;
        store.upsert_blacklist(&entry).unwrap();

        let loaded = store.blacklist_entry("x@example.com").unwrap().unwrap();
        assert!(loaded.is_permanent);
        assert_eq!(loaded.attempt_count, 2);
    }

    #[test]
    fn test_rate_state_lazy_row_and_record_sent() {
        let store = MemberStore::open_in_memory().unwrap();
        let day = date(2026, 3, 10);
        let limits = RateConfig { max_per_day: 5, ..RateConfig::default() };

        let state = store.rate_state(day, &limits).unwrap();
        assert_eq!(state.sent_today, 0);
        assert_eq!(state.max_per_day, 5);

        let now = Utc::now();
        store.record_sent(day, 3, now).unwrap();
        let state = store.rate_state(day, &limits).unwrap();
        assert_eq!(state.sent_today, 3);
        assert!(state.last_batch_time.is_some());

        // Exceeding the cap is rejected, count unchanged.
        assert!(store.record_sent(day, 3, now).is_err());
        assert_eq!(store.rate_state(day, &limits).unwrap().sent_today, 3);

        // A new day starts fresh.
        let next = store.rate_state(day + Duration::days(1), &limits).unwrap();
        assert_eq!(next.sent_today, 0);
    }
}
