#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use bozor::auth::create_jwt;
use bozor::models::*;
use bozor::moderation::ModerationEngine;
use bozor::quota::PostQuota;
use bozor::repo::inmem::InMemRepo;
use bozor::repo::{CategoryRepo, ListingRepo, ProfileRepo, RoleRepo};
use bozor::routes::{config, AppState};
use bozor::storage::{ImageStore, ImageStoreError};

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "integration-test-secret-0123456789abcdef");
    }
}

struct NullImageStore;

#[async_trait]
impl ImageStore for NullImageStore {
    async fn save(&self, hash: &str, _mime: &str, _bytes: &[u8]) -> Result<String, ImageStoreError> {
        Ok(self.url_for(hash))
    }
    async fn load(&self, _hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        Err(ImageStoreError::NotFound)
    }
    async fn delete(&self, _path: &str) -> Result<(), ImageStoreError> {
        Ok(())
    }
    fn url_for(&self, hash: &str) -> String {
        format!("http://images.test/listings/listings/{hash}")
    }
    fn path_for_url(&self, url: &str) -> Option<String> {
        bozor::storage::object_path(url, "listings").map(str::to_string)
    }
}

fn app_state_with_quota(quota: PostQuota) -> (web::Data<AppState>, Arc<InMemRepo>) {
    ensure_secret();
    let repo = Arc::new(InMemRepo::new());
    let state = AppState {
        repo: repo.clone(),
        image_store: Arc::new(NullImageStore),
        engine: Arc::new(ModerationEngine::new(repo.clone())),
        quota,
    };
    (web::Data::new(state), repo)
}

fn app_state() -> (web::Data<AppState>, Arc<InMemRepo>) {
    // generous quota; the quota path has its own test
    app_state_with_quota(PostQuota::new(100, 100))
}

async fn seed_user(repo: &InMemRepo, name: &str) -> (Id, String) {
    let id = Id::new_v4();
    repo.upsert_profile(Profile {
        user_id: id,
        display_name: name.into(),
        phone: None,
        status: ProfileStatus::Active,
        created_at: Utc::now(),
    })
    .await
    .unwrap();
    repo.set_role(id, Role::User, None).await.unwrap();
    (id, create_jwt(id).unwrap())
}

async fn seed_premium_user(repo: &InMemRepo, name: &str) -> (Id, String) {
    let (id, token) = seed_user(repo, name).await;
    repo.set_role(id, Role::Premium, Some(Utc::now() + Duration::days(30)))
        .await
        .unwrap();
    (id, token)
}

async fn seed_category(repo: &InMemRepo) -> Category {
    repo.create_category(NewCategory {
        name: "Furniture".into(),
        slug: format!("furniture-{}", Id::new_v4()),
        icon: None,
    })
    .await
    .unwrap()
}

fn listing_json(category_id: Id, images: &[&str]) -> Value {
    json!({
        "category_id": category_id,
        "title": "Oak table",
        "description": "solid wood",
        "price": 120,
        "location": "Bukhara",
        "images": images,
    })
}

#[actix_web::test]
async fn create_listing_enters_review_queue() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (owner, token) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(listing_json(cat.id, &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Listing = test::read_body_json(resp).await;
    assert_eq!(created.status, ListingStatus::Pending);
    assert_eq!(created.user_id, owner);
    assert!(created.expires_at.is_none());

    // invisible to the public feed while pending
    let req = test::TestRequest::get().uri("/api/v1/listings").to_request();
    let listings: Vec<Listing> = test::call_and_read_body_json(&app, req).await;
    assert!(listings.is_empty());

    // but visible to the owner
    let req = test::TestRequest::get()
        .uri("/api/v1/me/listings")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let mine: Vec<Listing> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(mine.len(), 1);

    // denormalized category counter moved
    let cats = repo.list_categories().await.unwrap();
    assert_eq!(cats.iter().find(|c| c.id == cat.id).unwrap().listing_count, 1);
}

#[actix_web::test]
async fn create_listing_requires_credential() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;
    let cat = seed_category(&repo).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .set_json(listing_json(cat.id, &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn negative_price_is_rejected() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (_owner, token) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;

    let mut body = listing_json(cat.id, &[]);
    body["price"] = json!(-5);
    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn image_caps_follow_privilege_tier() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (_std, std_token) = seed_user(&repo, "Standard").await;
    let (_prem, prem_token) = seed_premium_user(&repo, "Premium").await;
    let cat = seed_category(&repo).await;

    let three = ["http://images.test/listings/listings/a", "http://images.test/listings/listings/b", "http://images.test/listings/listings/c"];

    // third image is over the standard cap
    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {std_token}")))
        .set_json(listing_json(cat.id, &three))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {std_token}")))
        .set_json(listing_json(cat.id, &three[..2]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // premium tier takes all three
    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {prem_token}")))
        .set_json(listing_json(cat.id, &three))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
}

#[actix_web::test]
async fn daily_post_quota_is_enforced() {
    let (data, repo) = app_state_with_quota(PostQuota::new(1, 3));
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (_owner, token) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(listing_json(cat.id, &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/v1/listings")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(listing_json(cat.id, &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
}

#[actix_web::test]
async fn rejected_listing_can_be_resubmitted_by_owner() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (owner, owner_token) = seed_user(&repo, "Seller").await;
    let (_other, other_token) = seed_user(&repo, "Stranger").await;
    let cat = seed_category(&repo).await;

    let listing = repo
        .create_listing(
            owner,
            NewListing {
                category_id: cat.id,
                title: "Old sofa".into(),
                description: None,
                price: 40,
                location: None,
                images: vec![],
            },
        )
        .await
        .unwrap();
    repo.reject_listing(listing.id, "bad photos".into()).await.unwrap();

    // a stranger cannot touch it
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/listings/{}", listing.id))
        .insert_header(("Authorization", format!("Bearer {other_token}")))
        .set_json(json!({ "title": "hijacked" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // the owner's edit clears the rejection and re-enters review
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/listings/{}", listing.id))
        .insert_header(("Authorization", format!("Bearer {owner_token}")))
        .set_json(json!({ "title": "Old sofa, better photos" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Listing = test::read_body_json(resp).await;
    assert_eq!(updated.status, ListingStatus::Pending);
    assert!(updated.rejected_reason.is_none());
    assert_eq!(updated.title, "Old sofa, better photos");
}

#[actix_web::test]
async fn live_listing_cannot_be_edited() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (owner, token) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;
    let listing = repo
        .create_listing(
            owner,
            NewListing {
                category_id: cat.id,
                title: "Bike".into(),
                description: None,
                price: 70,
                location: None,
                images: vec![],
            },
        )
        .await
        .unwrap();
    repo.approve_listing(listing.id, false, Utc::now() + Duration::days(5))
        .await
        .unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/listings/{}", listing.id))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(json!({ "price": 60 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
async fn public_feed_puts_premium_first() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (owner, _) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;

    let mut ids = Vec::new();
    for title in ["first", "second", "third"] {
        let l = repo
            .create_listing(
                owner,
                NewListing {
                    category_id: cat.id,
                    title: title.into(),
                    description: None,
                    price: 10,
                    location: None,
                    images: vec![],
                },
            )
            .await
            .unwrap();
        ids.push(l.id);
    }
    let expiry = Utc::now() + Duration::days(5);
    repo.approve_listing(ids[0], false, expiry).await.unwrap();
    repo.approve_listing(ids[1], true, expiry).await.unwrap();
    // ids[2] stays pending

    let req = test::TestRequest::get().uri("/api/v1/listings").to_request();
    let listings: Vec<Listing> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0].id, ids[1]);
    assert!(listings[0].is_premium);
}

#[actix_web::test]
async fn detail_view_counts_and_hides_pending() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (owner, owner_token) = seed_user(&repo, "Seller").await;
    let cat = seed_category(&repo).await;
    let listing = repo
        .create_listing(
            owner,
            NewListing {
                category_id: cat.id,
                title: "Carpet".into(),
                description: None,
                price: 30,
                location: None,
                images: vec![],
            },
        )
        .await
        .unwrap();

    // anonymous readers cannot see a pending listing
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/listings/{}", listing.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // the owner can
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/listings/{}", listing.id))
        .insert_header(("Authorization", format!("Bearer {owner_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    repo.approve_listing(listing.id, false, Utc::now() + Duration::days(5))
        .await
        .unwrap();

    // public reads bump the view counter
    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/listings/{}", listing.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
    let after = repo.get_listing(listing.id).await.unwrap();
    assert_eq!(after.views_count, 2);
}

#[actix_web::test]
async fn image_fetch_refuses_malformed_hashes() {
    let (data, _repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    // multibyte first character, short, and non-hex names all 404 before
    // any store access
    for uri in ["/images/%E6%97%A5ab", "/images/a", "/images/zz00"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404, "{uri}");
    }
}

#[actix_web::test]
async fn me_returns_profile_and_role() {
    let (data, repo) = app_state();
    let app = test::init_service(App::new().app_data(data).configure(config)).await;

    let (_id, token) = seed_premium_user(&repo, "Gulnora").await;
    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["profile"]["display_name"], json!("Gulnora"));
    assert_eq!(body["role"]["role"], json!("premium"));
}
