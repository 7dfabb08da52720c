//! Credential store: users, sessions, OTP records, reset tickets, login days.

use chrono::NaiveDate;
use codeverse_core::{OtpRecord, ResetTicket, Session, User};
use rocksdb::WriteBatch;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::StoreError;
use crate::rocks::{
    compound_key, decode, encode, AppStore, CF_EMAILS, CF_LOGINS, CF_OTP, CF_SESSIONS,
    CF_TICKETS, CF_USERS,
};

/// Outcome of [`AppStore::check_otp`].
#[derive(Debug, Clone, PartialEq)]
pub enum OtpCheck {
    /// No record for this email.
    Missing,
    /// The record had expired and was removed.
    Expired,
    /// Wrong code. `discarded` is set when this attempt used up the last try.
    Mismatch { attempts: u32, discarded: bool },
    /// Right code. The record was consumed.
    Accepted(OtpRecord),
}

impl AppStore {
    // ─── Users ────────────────────────────────────────────────────────

    /// Insert a new user. Fails with `Conflict` when the email is taken.
    pub fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if self.exists(CF_EMAILS, user.email.as_bytes())? {
            return Err(StoreError::Conflict(format!("email already registered: {}", user.email)));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_USERS)?, user.id.as_bytes(), encode(user)?);
        batch.put_cf(self.cf(CF_EMAILS)?, user.email.as_bytes(), user.id.as_bytes());
        self.write(batch)?;

        log::debug!("Inserted user {}", user.id);
        Ok(())
    }

    pub fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.get_value(CF_USERS, user_id.as_bytes())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let Some(id_bytes) = self.db.get_cf(self.cf(CF_EMAILS)?, email.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes).map_err(|_| StoreError::CorruptKey(CF_EMAILS))?;
        self.get_user(id)
    }

    /// Replace the password hash of the account with this email.
    ///
    /// Returns `false` when no such account exists.
    pub fn update_password(&self, email: &str, password_hash: &str) -> Result<bool, StoreError> {
        let _guard = self.lock()?;
        let Some(mut user) = self.find_user_by_email(email)? else {
            return Ok(false);
        };
        user.password_hash = password_hash.to_string();
        self.put_value(CF_USERS, user.id.as_bytes(), &user)?;
        Ok(true)
    }

    // ─── Sessions ─────────────────────────────────────────────────────

    pub fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        self.put_value(CF_SESSIONS, session.token.as_bytes(), session)
    }

    pub fn get_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        self.get_value(CF_SESSIONS, token.as_bytes())
    }

    /// Returns whether a session was removed.
    pub fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        let existed = self.exists(CF_SESSIONS, token.as_bytes())?;
        if existed {
            let mut batch = WriteBatch::default();
            batch.delete_cf(self.cf(CF_SESSIONS)?, token.as_bytes());
            self.write(batch)?;
        }
        Ok(existed)
    }

    /// Revoke every session of a user. Returns how many were removed.
    pub fn delete_user_sessions(&self, user_id: Uuid) -> Result<usize, StoreError> {
        self.delete_sessions_where(|s| s.user_id == user_id)
    }

    /// Drop sessions that expired at or before `now`.
    pub fn purge_expired_sessions(&self, now: u64) -> Result<usize, StoreError> {
        self.delete_sessions_where(|s| s.is_expired(now))
    }

    fn delete_sessions_where<F>(&self, predicate: F) -> Result<usize, StoreError>
    where
        F: Fn(&Session) -> bool,
    {
        let cf = self.cf(CF_SESSIONS)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for (key, value) in self.scan_all(CF_SESSIONS)? {
            let session: Session = decode(&value)?;
            if predicate(&session) {
                batch.delete_cf(cf, &key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.write(batch)?;
        }
        Ok(removed)
    }

    // ─── OTP ──────────────────────────────────────────────────────────

    /// Store a fresh OTP, replacing any previous one for the same email.
    pub fn save_otp(&self, record: &OtpRecord) -> Result<(), StoreError> {
        self.put_value(CF_OTP, record.email.as_bytes(), record)
    }

    pub fn get_otp(&self, email: &str) -> Result<Option<OtpRecord>, StoreError> {
        self.get_value(CF_OTP, email.as_bytes())
    }

    /// Apply `f` to the stored record under the store lock.
    ///
    /// Returns the updated record, or `None` if there was none.
    pub fn update_otp<F>(&self, email: &str, f: F) -> Result<Option<OtpRecord>, StoreError>
    where
        F: FnOnce(&mut OtpRecord),
    {
        let _guard = self.lock()?;
        let Some(mut record) = self.get_otp(email)? else {
            return Ok(None);
        };
        f(&mut record);
        self.save_otp(&record)?;
        Ok(Some(record))
    }

    /// Compare `code` against the stored OTP and settle the outcome in one step.
    ///
    /// A mismatch counts an attempt and removes the record once
    /// `max_attempts` wrong codes were seen; a match consumes it. Concurrent
    /// checks are serialized, so no more than `max_attempts` wrong codes are
    /// ever compared against one record.
    pub fn check_otp(
        &self,
        email: &str,
        code: &str,
        now: u64,
        max_attempts: u32,
    ) -> Result<OtpCheck, StoreError> {
        let _guard = self.lock()?;
        let Some(mut record) = self.get_otp(email)? else {
            return Ok(OtpCheck::Missing);
        };
        if record.is_expired(now) {
            self.clear_otp(email)?;
            return Ok(OtpCheck::Expired);
        }
        if record.code != code {
            record.attempts += 1;
            let discarded = record.attempts >= max_attempts;
            if discarded {
                self.clear_otp(email)?;
            } else {
                self.save_otp(&record)?;
            }
            return Ok(OtpCheck::Mismatch { attempts: record.attempts, discarded });
        }
        self.clear_otp(email)?;
        Ok(OtpCheck::Accepted(record))
    }

    /// Remove and return the OTP for this email, atomically with respect to other callers.
    pub fn take_otp(&self, email: &str) -> Result<Option<OtpRecord>, StoreError> {
        let _guard = self.lock()?;
        let record = self.get_otp(email)?;
        if record.is_some() {
            self.clear_otp(email)?;
        }
        Ok(record)
    }

    pub fn clear_otp(&self, email: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_OTP)?, email.as_bytes());
        self.write(batch)
    }

    // ─── Reset tickets ────────────────────────────────────────────────

    pub fn put_ticket(&self, ticket: &ResetTicket) -> Result<(), StoreError> {
        self.put_value(CF_TICKETS, ticket.token.as_bytes(), ticket)
    }

    /// Fetch and delete a ticket. A ticket can be taken at most once.
    pub fn take_ticket(&self, token: &str) -> Result<Option<ResetTicket>, StoreError> {
        let _guard = self.lock()?;
        let ticket: Option<ResetTicket> = self.get_value(CF_TICKETS, token.as_bytes())?;
        if ticket.is_some() {
            let mut batch = WriteBatch::default();
            batch.delete_cf(self.cf(CF_TICKETS)?, token.as_bytes());
            self.write(batch)?;
        }
        Ok(ticket)
    }

    /// Drop every outstanding ticket for an email.
    pub fn clear_tickets_for(&self, email: &str) -> Result<usize, StoreError> {
        let cf = self.cf(CF_TICKETS)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for (key, value) in self.scan_all(CF_TICKETS)? {
            let ticket: ResetTicket = decode(&value)?;
            if ticket.email == email {
                batch.delete_cf(cf, &key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.write(batch)?;
        }
        Ok(removed)
    }

    // ─── Login days ───────────────────────────────────────────────────

    /// Mark `day` as a login day for the user. Idempotent.
    pub fn record_login(&self, user_id: Uuid, day: NaiveDate) -> Result<(), StoreError> {
        let key = Self::login_key(user_id, day);
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_LOGINS)?, key, b"");
        self.write(batch)
    }

    pub fn login_days(&self, user_id: Uuid) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let mut days = BTreeSet::new();
        for (key, _) in self.scan_prefix(CF_LOGINS, user_id.as_bytes())? {
            let raw: [u8; 4] = key
                .get(16..20)
                .and_then(|s| s.try_into().ok())
                .ok_or(StoreError::CorruptKey(CF_LOGINS))?;
            let day = i32::try_from(u32::from_be_bytes(raw))
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or(StoreError::CorruptKey(CF_LOGINS))?;
            days.insert(day);
        }
        Ok(days)
    }

    /// `user_id (16 bytes) + days since CE (4 bytes BE)`.
    fn login_key(user_id: Uuid, day: NaiveDate) -> Vec<u8> {
        let days = u32::try_from(day.num_days_from_ce()).unwrap_or(0);
        compound_key(&[user_id.as_bytes(), &days.to_be_bytes()])
    }
}
