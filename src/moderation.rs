use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::ApiError;
use crate::models::{Id, Listing, ListingStatus, Role};
use crate::repo::{Repo, RepoError};

pub const DEFAULT_REJECT_REASON: &str = "Rejected by administrator";
pub const DEFAULT_APPROVE_DAYS: i64 = 5;
pub const DEFAULT_EXTEND_DAYS: i64 = 5;
pub const DEFAULT_PREMIUM_DAYS: i64 = 30;
/// Upper bound on any validity/extension/premium window. Keeps admin
/// input well inside what date arithmetic can represent.
pub const MAX_DAYS: i64 = 3650;

fn days_in_range(days: i64) -> bool {
    (1..=MAX_DAYS).contains(&days)
}

#[derive(thiserror::Error, Debug)]
pub enum ModerationError {
    #[error("listing not found")]
    NotFound,
    #[error("listing is not pending review")]
    NotPending,
    #[error("listing has no expiry to extend")]
    NoExpiry,
    #[error("days must be between 1 and {MAX_DAYS}")]
    InvalidDays,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<ModerationError> for ApiError {
    fn from(e: ModerationError) -> Self {
        match e {
            ModerationError::NotFound => ApiError::NotFound,
            ModerationError::NotPending | ModerationError::NoExpiry => {
                ApiError::Conflict(e.to_string())
            }
            ModerationError::InvalidDays => ApiError::BadRequest(e.to_string()),
            ModerationError::Repo(re) => re.into(),
        }
    }
}

/// State machine over the listing lifecycle. Callers are verified admins
/// (the HTTP layer gates on the stored role before dispatching here); the
/// engine itself holds an admin-scoped store handle and enforces the
/// transition preconditions.
///
/// Every transition is applied as one status-guarded single-row update, so
/// a persistence failure or a lost race leaves the listing untouched.
pub struct ModerationEngine {
    repo: Arc<dyn Repo>,
}

impl ModerationEngine {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo }
    }

    /// pending -> active, with expires_at = now + validity_days.
    pub async fn approve(&self, listing_id: Id, make_premium: bool, validity_days: i64) -> Result<Listing, ModerationError> {
        self.approve_at(listing_id, make_premium, validity_days, Utc::now()).await
    }

    pub async fn approve_at(
        &self,
        listing_id: Id,
        make_premium: bool,
        validity_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Listing, ModerationError> {
        if !days_in_range(validity_days) {
            return Err(ModerationError::InvalidDays);
        }
        let expires_at = now + Duration::days(validity_days);
        let listing = self
            .repo
            .approve_listing(listing_id, make_premium, expires_at)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => ModerationError::NotFound,
                RepoError::Conflict => ModerationError::NotPending,
                other => ModerationError::Repo(other),
            })?;
        info!(listing_id = %listing_id, premium = make_premium, %expires_at, "listing approved");
        Ok(listing)
    }

    /// pending -> rejected. A missing reason falls back to a non-empty
    /// default so the owner always sees why.
    pub async fn reject(&self, listing_id: Id, reason: Option<String>) -> Result<Listing, ModerationError> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string());
        let listing = self
            .repo
            .reject_listing(listing_id, reason)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => ModerationError::NotFound,
                RepoError::Conflict => ModerationError::NotPending,
                other => ModerationError::Repo(other),
            })?;
        info!(listing_id = %listing_id, "listing rejected");
        Ok(listing)
    }

    /// Push expiry out by `extra_days`, counting from max(current expiry,
    /// now) so a long-lapsed listing never receives a negative-duration
    /// extension. An `expired` listing is revived to `active`.
    pub async fn extend(&self, listing_id: Id, extra_days: i64) -> Result<Listing, ModerationError> {
        self.extend_at(listing_id, extra_days, Utc::now()).await
    }

    pub async fn extend_at(&self, listing_id: Id, extra_days: i64, now: DateTime<Utc>) -> Result<Listing, ModerationError> {
        if !days_in_range(extra_days) {
            return Err(ModerationError::InvalidDays);
        }
        let listing = self
            .repo
            .extend_listing(listing_id, now, extra_days)
            .await
            .map_err(|e| match e {
                RepoError::NotFound => ModerationError::NotFound,
                RepoError::Conflict => ModerationError::NoExpiry,
                other => ModerationError::Repo(other),
            })?;
        debug_assert_eq!(listing.status, ListingStatus::Active);
        info!(listing_id = %listing_id, expires_at = ?listing.expires_at, "listing extended");
        Ok(listing)
    }

    /// Grant the premium tier for `days` (role mutation, not a listing
    /// transition).
    pub async fn set_premium(&self, user_id: Id, days: i64) -> Result<(), ModerationError> {
        if !days_in_range(days) {
            return Err(ModerationError::InvalidDays);
        }
        let until = Utc::now() + Duration::days(days);
        self.repo
            .set_role(user_id, Role::Premium, Some(until))
            .await
            .map_err(ModerationError::Repo)?;
        info!(user_id = %user_id, %until, "premium granted");
        Ok(())
    }

    pub async fn remove_premium(&self, user_id: Id) -> Result<(), ModerationError> {
        self.repo
            .set_role(user_id, Role::User, None)
            .await
            .map_err(ModerationError::Repo)?;
        info!(user_id = %user_id, "premium removed");
        Ok(())
    }
}
