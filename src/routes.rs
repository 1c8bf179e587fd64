use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::TryStreamExt as _;
use sha2::{Digest, Sha256};

use crate::auth::{require_admin, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::moderation::ModerationEngine;
use crate::quota::PostQuota;
use crate::repo::{Repo, RepoError};
use crate::storage::{ImageStore, ImageStoreError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/listings")
                    .route(web::get().to(list_listings))
                    .route(web::post().to(create_listing)),
            )
            .service(
                web::resource("/listings/{id}")
                    .route(web::get().to(get_listing))
                    .route(web::put().to(update_listing)),
            )
            .service(web::resource("/me").route(web::get().to(auth_me)))
            .service(web::resource("/me/listings").route(web::get().to(my_listings)))
            .service(web::resource("/categories").route(web::get().to(list_categories)))
            .service(web::resource("/partners").route(web::get().to(list_partners)))
            .service(web::resource("/banners").route(web::get().to(list_banners)))
            .service(web::resource("/images").route(web::post().to(upload_image)))
            .service(web::resource("/admin").route(web::post().to(crate::admin::dispatch))),
    );
    // public fetch route (no /api/v1 prefix so <img src="/images/{hash}"> works)
    cfg.route("/images/{hash}", web::get().to(get_image));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub engine: Arc<ModerationEngine>,
    pub quota: PostQuota,
}

/// Privilege-tier image caps at creation time (not re-validated
/// retroactively when a grant lapses).
pub const STANDARD_IMAGE_LIMIT: usize = 2;
pub const PREMIUM_IMAGE_LIMIT: usize = 3;

fn image_limit(premium: bool) -> usize {
    if premium {
        PREMIUM_IMAGE_LIMIT
    } else {
        STANDARD_IMAGE_LIMIT
    }
}

async fn is_admin(repo: &dyn Repo, auth: &Option<Auth>) -> bool {
    match auth {
        Some(a) => require_admin(repo, a.0.sub).await.is_ok(),
        None => false,
    }
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListingsQuery {
    pub category_id: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/api/v1/listings",
    params(ListingsQuery),
    responses(
        (status = 200, description = "Active listings, premium first", body = [Listing])
    )
)]
pub async fn list_listings(
    data: web::Data<AppState>,
    query: web::Query<ListingsQuery>,
) -> Result<HttpResponse, ApiError> {
    let listings = data.repo.list_active(query.category_id).await?;
    Ok(HttpResponse::Ok().json(listings))
}

#[utoipa::path(
    get,
    path = "/api/v1/listings/{id}",
    params(("id" = Id, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing", body = Listing),
        (status = 404, description = "Listing not found or not visible")
    )
)]
pub async fn get_listing(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let listing = data.repo.get_listing(id).await?;
    if listing.status == ListingStatus::Active {
        // views_count only ever moves forward; losing an increment on a
        // concurrent read is acceptable
        let _ = data.repo.increment_views(id).await;
        return Ok(HttpResponse::Ok().json(listing));
    }
    // non-active listings are visible to their owner and to admins only
    let owner = auth.as_ref().map(|a| a.0.sub) == Some(listing.user_id);
    if owner || is_admin(data.repo.as_ref(), &auth).await {
        return Ok(HttpResponse::Ok().json(listing));
    }
    Err(ApiError::NotFound)
}

#[utoipa::path(
    post,
    path = "/api/v1/listings",
    request_body = NewListing,
    responses(
        (status = 201, description = "Listing created in pending status", body = Listing),
        (status = 400, description = "Too many images for tier"),
        (status = 429, description = "Daily post quota exhausted")
    )
)]
pub async fn create_listing(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewListing>,
) -> Result<HttpResponse, ApiError> {
    let owner = auth.0.sub;
    let new = payload.into_inner();
    if new.price < 0 {
        return Err(ApiError::BadRequest("price must not be negative".into()));
    }
    let premium = data
        .repo
        .get_user_role(owner)
        .await?
        .map(|r| r.is_premium_at(Utc::now()))
        .unwrap_or(false);
    let limit = image_limit(premium);
    if new.images.len() > limit {
        return Err(ApiError::BadRequest(format!("at most {limit} images allowed")));
    }
    if !data.quota.allow_post(owner, premium) {
        return Err(ApiError::RateLimited);
    }
    let listing = data.repo.create_listing(owner, new).await?;
    Ok(HttpResponse::Created().json(listing))
}

#[utoipa::path(
    put,
    path = "/api/v1/listings/{id}",
    request_body = UpdateListing,
    params(("id" = Id, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing updated and resubmitted for review", body = Listing),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Listing is active or expired")
    )
)]
pub async fn update_listing(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateListing>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let upd = payload.into_inner();
    let listing = data.repo.get_listing(id).await?;
    if listing.user_id != auth.0.sub {
        return Err(ApiError::Forbidden);
    }
    if let Some(price) = upd.price {
        if price < 0 {
            return Err(ApiError::BadRequest("price must not be negative".into()));
        }
    }
    if let Some(ref images) = upd.images {
        let premium = data
            .repo
            .get_user_role(auth.0.sub)
            .await?
            .map(|r| r.is_premium_at(Utc::now()))
            .unwrap_or(false);
        let limit = image_limit(premium);
        if images.len() > limit {
            return Err(ApiError::BadRequest(format!("at most {limit} images allowed")));
        }
    }
    let updated = data
        .repo
        .resubmit_listing(id, auth.0.sub, upd)
        .await
        .map_err(|e| match e {
            RepoError::Conflict => {
                ApiError::Conflict("only pending or rejected listings can be edited".into())
            }
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    get,
    path = "/api/v1/me/listings",
    responses(
        (status = 200, description = "Caller's listings, all statuses", body = [Listing]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_listings(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let listings = data.repo.list_by_owner(auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(listings))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub profile: Option<Profile>,
    pub role: Option<UserRole>,
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current user profile and role", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = data.repo.get_profile(auth.0.sub).await?;
    let role = data.repo.get_user_role(auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(MeResponse { profile, role }))
}

pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_categories().await?))
}

pub async fn list_partners(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_partners().await?))
}

pub async fn list_banners(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_banners().await?))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ImageUploadResponse {
    pub url: String,
    pub hash: String,
    pub mime: String,
    pub size: usize,
    pub duplicate: bool, // true when upload was a duplicate (idempotent)
}

const IMAGE_SIZE_LIMIT: usize = 2 * 1024 * 1024; // clients compress to ~500KB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

#[utoipa::path(
    post,
    path = "/api/v1/images",
    responses(
        (status = 201, description = "Image stored (new)", body = ImageUploadResponse),
        (status = 200, description = "Image already existed (idempotent)", body = ImageUploadResponse),
        (status = 415, description = "Unsupported media type"),
        (status = 413, description = "Payload too large"),
    )
)]
pub async fn upload_image(
    _auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        if let Some(name) = field.content_disposition().get_name() {
            if name != "file" {
                continue;
            }
        } else {
            continue;
        }
        let mut field_stream = field;
        let mut hasher = Sha256::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            hasher.update(&chunk);
            bytes.extend_from_slice(&chunk);
        }
        let hash = format!("{:x}", hasher.finalize());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }
        let (url, status_code, duplicate) = match data.image_store.save(&hash, &mime, &bytes).await {
            Ok(url) => (url, StatusCode::CREATED, false),
            Err(ImageStoreError::Duplicate) => {
                (data.image_store.url_for(&hash), StatusCode::OK, true)
            }
            Err(e) => {
                log::error!("image_store save error: {e}");
                return Err(ApiError::Internal);
            }
        };
        let resp = ImageUploadResponse { url, hash, mime, size: bytes.len(), duplicate };
        return Ok(HttpResponse::build(status_code).json(resp));
    }
    Ok(HttpResponse::BadRequest().finish())
}

pub async fn get_image(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let hash = path.into_inner();
    if !crate::storage::is_content_hash(&hash) {
        return Err(ApiError::NotFound);
    }
    match data.image_store.load(&hash).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .body(bytes)),
        Err(ImageStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("image_store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}
