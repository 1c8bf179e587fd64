use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{require_admin, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::moderation::{DEFAULT_APPROVE_DAYS, DEFAULT_EXTEND_DAYS, DEFAULT_PREMIUM_DAYS};
use crate::repo::RepoError;
use crate::routes::AppState;

/// One administrative command. A tagged variant per action gives
/// exhaustive dispatch; an unknown action fails deserialization and
/// surfaces as a 400 before any handler code runs.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    GetStats,
    GetPendingListings,
    GetAllListings {
        status: Option<ListingStatus>,
    },
    ApproveListing {
        listing_id: Id,
        #[serde(default)]
        is_premium: bool,
        days: Option<i64>,
    },
    RejectListing {
        listing_id: Id,
        reason: Option<String>,
    },
    ExtendListing {
        listing_id: Id,
        extend_days: Option<i64>,
    },
    GetAllUsers,
    SetPremium {
        user_id: Id,
        premium_days: Option<i64>,
    },
    RemovePremium {
        user_id: Id,
    },
    BlockUser {
        user_id: Id,
    },
    UnblockUser {
        user_id: Id,
    },
    GetCategories,
    CreateCategory {
        #[serde(flatten)]
        category: NewCategory,
    },
    UpdateCategory {
        category_id: Id,
        #[serde(flatten)]
        fields: UpdateCategory,
    },
    DeleteCategory {
        category_id: Id,
    },
    GetPartners,
    CreatePartner {
        #[serde(flatten)]
        partner: NewPartner,
    },
    UpdatePartner {
        partner_id: Id,
        #[serde(flatten)]
        fields: UpdatePartner,
    },
    DeletePartner {
        partner_id: Id,
    },
    GetBanners,
    CreateBanner {
        #[serde(flatten)]
        banner: NewBanner,
    },
    UpdateBanner {
        banner_id: Id,
        #[serde(flatten)]
        fields: UpdateBanner,
    },
    DeleteBanner {
        banner_id: Id,
    },
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserOverview {
    #[serde(flatten)]
    pub profile: Profile,
    pub role: Option<UserRole>,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin",
    responses(
        (status = 200, description = "Action result"),
        (status = 400, description = "Unknown action or invalid parameters"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Valid credential, not an admin"),
        (status = 409, description = "Precondition failed"),
    )
)]
pub async fn dispatch(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<AdminAction>,
) -> Result<HttpResponse, ApiError> {
    // role check before any mutation is attempted
    require_admin(data.repo.as_ref(), auth.0.sub).await?;
    let repo = &data.repo;
    let engine = &data.engine;

    let body = match payload.into_inner() {
        AdminAction::GetStats => {
            let stats = AdminStats {
                total_users: repo.count_profiles().await?,
                premium_users: repo.count_premium().await?,
                pending_listings: repo.count_listings(ListingStatus::Pending).await?,
                active_listings: repo.count_listings(ListingStatus::Active).await?,
                blocked_users: repo.count_blocked().await?,
            };
            serde_json::to_value(stats).map_err(|_| ApiError::Internal)?
        }
        AdminAction::GetPendingListings => {
            let listings = repo.list_overview(Some(ListingStatus::Pending)).await?;
            serde_json::to_value(listings).map_err(|_| ApiError::Internal)?
        }
        AdminAction::GetAllListings { status } => {
            let listings = repo.list_overview(status).await?;
            serde_json::to_value(listings).map_err(|_| ApiError::Internal)?
        }
        AdminAction::ApproveListing { listing_id, is_premium, days } => {
            let listing = engine
                .approve(listing_id, is_premium, days.unwrap_or(DEFAULT_APPROVE_DAYS))
                .await?;
            json!({ "success": true, "message": "Listing approved", "listing": listing })
        }
        AdminAction::RejectListing { listing_id, reason } => {
            let listing = engine.reject(listing_id, reason).await?;
            json!({ "success": true, "message": "Listing rejected", "listing": listing })
        }
        AdminAction::ExtendListing { listing_id, extend_days } => {
            let listing = engine
                .extend(listing_id, extend_days.unwrap_or(DEFAULT_EXTEND_DAYS))
                .await?;
            json!({ "success": true, "message": "Listing extended", "listing": listing })
        }
        AdminAction::GetAllUsers => {
            let profiles = repo.list_profiles().await?;
            let ids: Vec<Id> = profiles.iter().map(|p| p.user_id).collect();
            let mut roles = repo.get_user_roles(&ids).await?;
            let users: Vec<UserOverview> = profiles
                .into_iter()
                .map(|profile| {
                    let role = roles.remove(&profile.user_id);
                    UserOverview { profile, role }
                })
                .collect();
            serde_json::to_value(users).map_err(|_| ApiError::Internal)?
        }
        AdminAction::SetPremium { user_id, premium_days } => {
            engine
                .set_premium(user_id, premium_days.unwrap_or(DEFAULT_PREMIUM_DAYS))
                .await?;
            json!({ "success": true, "message": "Premium granted" })
        }
        AdminAction::RemovePremium { user_id } => {
            engine.remove_premium(user_id).await?;
            json!({ "success": true, "message": "Premium removed" })
        }
        AdminAction::BlockUser { user_id } => {
            repo.set_profile_status(user_id, ProfileStatus::Blocked).await?;
            json!({ "success": true, "message": "User blocked" })
        }
        AdminAction::UnblockUser { user_id } => {
            repo.set_profile_status(user_id, ProfileStatus::Active).await?;
            json!({ "success": true, "message": "User unblocked" })
        }
        AdminAction::GetCategories => {
            serde_json::to_value(repo.list_categories().await?).map_err(|_| ApiError::Internal)?
        }
        AdminAction::CreateCategory { category } => {
            let created = repo.create_category(category).await.map_err(|e| match e {
                RepoError::Conflict => ApiError::Conflict("category slug already exists".into()),
                other => other.into(),
            })?;
            json!({ "success": true, "category": created })
        }
        AdminAction::UpdateCategory { category_id, fields } => {
            let updated = repo.update_category(category_id, fields).await?;
            json!({ "success": true, "category": updated })
        }
        AdminAction::DeleteCategory { category_id } => {
            repo.delete_category(category_id).await.map_err(|e| match e {
                RepoError::Conflict => ApiError::Conflict(
                    "category still has listings; move them to another category first".into(),
                ),
                other => other.into(),
            })?;
            json!({ "success": true, "message": "Category deleted" })
        }
        AdminAction::GetPartners => {
            serde_json::to_value(repo.list_partners().await?).map_err(|_| ApiError::Internal)?
        }
        AdminAction::CreatePartner { partner } => {
            let created = repo.create_partner(partner).await?;
            json!({ "success": true, "partner": created })
        }
        AdminAction::UpdatePartner { partner_id, fields } => {
            let updated = repo.update_partner(partner_id, fields).await?;
            json!({ "success": true, "partner": updated })
        }
        AdminAction::DeletePartner { partner_id } => {
            repo.delete_partner(partner_id).await?;
            json!({ "success": true, "message": "Partner deleted" })
        }
        AdminAction::GetBanners => {
            serde_json::to_value(repo.list_banners().await?).map_err(|_| ApiError::Internal)?
        }
        AdminAction::CreateBanner { banner } => {
            let created = repo.create_banner(banner).await?;
            json!({ "success": true, "banner": created })
        }
        AdminAction::UpdateBanner { banner_id, fields } => {
            let updated = repo.update_banner(banner_id, fields).await?;
            json!({ "success": true, "banner": updated })
        }
        AdminAction::DeleteBanner { banner_id } => {
            repo.delete_banner(banner_id).await?;
            json!({ "success": true, "message": "Banner deleted" })
        }
    };

    Ok(HttpResponse::Ok().json(body))
}
