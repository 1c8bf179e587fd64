#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use chrono::{Duration, Utc};

use bozor::models::*;
use bozor::moderation::{ModerationEngine, ModerationError, DEFAULT_REJECT_REASON, MAX_DAYS};
use bozor::repo::inmem::InMemRepo;
use bozor::repo::{CategoryRepo, ListingRepo, RoleRepo};

fn engine_and_repo() -> (ModerationEngine, Arc<InMemRepo>) {
    let repo = Arc::new(InMemRepo::new());
    (ModerationEngine::new(repo.clone()), repo)
}

async fn seed_listing(repo: &InMemRepo) -> Listing {
    let cat = repo
        .create_category(NewCategory {
            name: "Electronics".into(),
            slug: "electronics".into(),
            icon: None,
        })
        .await
        .unwrap();
    repo.create_listing(
        Id::new_v4(),
        NewListing {
            category_id: cat.id,
            title: "iPhone 14 Pro".into(),
            description: Some("like new".into()),
            price: 900,
            location: Some("Tashkent".into()),
            images: vec![],
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn approve_sets_active_with_expiry() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    assert_eq!(listing.status, ListingStatus::Pending);
    assert!(listing.expires_at.is_none());

    let now = Utc::now();
    let approved = engine.approve(listing.id, true, 5).await.unwrap();
    assert_eq!(approved.status, ListingStatus::Active);
    assert!(approved.is_premium);
    let expires = approved.expires_at.expect("active listing has expiry");
    assert!(expires > now);
    assert!((expires - (now + Duration::days(5))).num_seconds().abs() <= 1);
}

#[tokio::test]
async fn approve_requires_pending() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    engine.approve(listing.id, false, 5).await.unwrap();

    // second approval hits the status guard, listing unchanged
    let err = engine.approve(listing.id, true, 30).await.unwrap_err();
    assert!(matches!(err, ModerationError::NotPending));
    let after = repo.get_listing(listing.id).await.unwrap();
    assert_eq!(after.status, ListingStatus::Active);
    assert!(!after.is_premium);
}

#[tokio::test]
async fn approve_missing_listing_not_found() {
    let (engine, _repo) = engine_and_repo();
    let err = engine.approve(Id::new_v4(), false, 5).await.unwrap_err();
    assert!(matches!(err, ModerationError::NotFound));
}

#[tokio::test]
async fn reject_without_reason_uses_default() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;

    let rejected = engine.reject(listing.id, None).await.unwrap();
    assert_eq!(rejected.status, ListingStatus::Rejected);
    assert_eq!(rejected.rejected_reason.as_deref(), Some(DEFAULT_REJECT_REASON));
    assert!(rejected.expires_at.is_none());
}

#[tokio::test]
async fn reject_blank_reason_uses_default() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    let rejected = engine.reject(listing.id, Some("   ".into())).await.unwrap();
    let reason = rejected.rejected_reason.unwrap();
    assert!(!reason.trim().is_empty());
}

#[tokio::test]
async fn rejected_reason_set_iff_rejected() {
    let (engine, repo) = engine_and_repo();
    let pending = seed_listing(&repo).await;
    assert!(pending.rejected_reason.is_none());

    let rejected = engine.reject(pending.id, Some("spam".into())).await.unwrap();
    assert!(rejected.rejected_reason.is_some());

    let other = seed_listing(&repo).await;
    let approved = engine.approve(other.id, false, 5).await.unwrap();
    assert!(approved.rejected_reason.is_none());
}

#[tokio::test]
async fn reject_requires_pending() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    engine.approve(listing.id, false, 5).await.unwrap();
    let err = engine.reject(listing.id, None).await.unwrap_err();
    assert!(matches!(err, ModerationError::NotPending));
}

#[tokio::test]
async fn extend_counts_from_now_for_stale_expiry() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;

    // approved two weeks ago for 4 days => expired 10 days ago
    let past = Utc::now() - Duration::days(14);
    engine.approve_at(listing.id, false, 4, past).await.unwrap();

    let now = Utc::now();
    let extended = engine.extend_at(listing.id, 5, now).await.unwrap();
    let expires = extended.expires_at.unwrap();
    // counted from now, not from the stale expiry
    assert!((expires - (now + Duration::days(5))).num_seconds().abs() <= 1);
    assert_eq!(extended.status, ListingStatus::Active);
}

#[tokio::test]
async fn extend_from_future_expiry_appends() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    let now = Utc::now();
    engine.approve_at(listing.id, false, 10, now).await.unwrap();

    let extended = engine.extend_at(listing.id, 5, now).await.unwrap();
    let expires = extended.expires_at.unwrap();
    assert!((expires - (now + Duration::days(15))).num_seconds().abs() <= 1);
}

#[tokio::test]
async fn extend_requires_existing_expiry() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    let err = engine.extend(listing.id, 5).await.unwrap_err();
    assert!(matches!(err, ModerationError::NoExpiry));
}

#[tokio::test]
async fn non_positive_durations_refused() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    assert!(matches!(
        engine.approve(listing.id, false, 0).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
    assert!(matches!(
        engine.extend(listing.id, -3).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
    assert!(matches!(
        engine.set_premium(Id::new_v4(), 0).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
    // untouched by the failed calls
    let after = repo.get_listing(listing.id).await.unwrap();
    assert_eq!(after.status, ListingStatus::Pending);
}

#[tokio::test]
async fn oversized_durations_refused() {
    let (engine, repo) = engine_and_repo();
    let listing = seed_listing(&repo).await;
    // far beyond any sane validity window; must fail cleanly, not blow up
    // inside date arithmetic
    assert!(matches!(
        engine.approve(listing.id, false, i64::MAX).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
    assert!(matches!(
        engine.set_premium(Id::new_v4(), MAX_DAYS + 1).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
    let after = repo.get_listing(listing.id).await.unwrap();
    assert_eq!(after.status, ListingStatus::Pending);

    engine.approve(listing.id, false, 5).await.unwrap();
    assert!(matches!(
        engine.extend(listing.id, i64::MAX).await.unwrap_err(),
        ModerationError::InvalidDays
    ));
}

#[tokio::test]
async fn premium_grant_and_removal() {
    let (engine, repo) = engine_and_repo();
    let user = Id::new_v4();

    engine.set_premium(user, 30).await.unwrap();
    let role = repo.get_user_role(user).await.unwrap().unwrap();
    assert_eq!(role.role, Role::Premium);
    let until = role.premium_until.expect("premium grant is time-bounded");
    assert!(until > Utc::now());
    assert!(role.is_premium_at(Utc::now()));

    engine.remove_premium(user).await.unwrap();
    let role = repo.get_user_role(user).await.unwrap().unwrap();
    assert_eq!(role.role, Role::User);
    assert!(role.premium_until.is_none());
}

#[tokio::test]
async fn lapsed_premium_grant_loses_privileges() {
    let role = UserRole {
        user_id: Id::new_v4(),
        role: Role::Premium,
        premium_until: Some(Utc::now() - Duration::days(1)),
    };
    assert!(!role.is_premium_at(Utc::now()));
}
