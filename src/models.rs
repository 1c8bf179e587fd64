use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = Uuid;

/// Lifecycle state of a listing. Transitions are monotonic:
/// pending -> active | rejected, active -> expired, expired -> deleted.
/// Only an owner edit re-enters pending (from pending/rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "listing_status", rename_all = "lowercase")]
pub enum ListingStatus {
    Pending,
    Active,
    Rejected,
    Expired,
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Active => "active",
            ListingStatus::Rejected => "rejected",
            ListingStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Listing {
    pub id: Id,
    pub user_id: Id,
    pub category_id: Id,
    pub title: String,
    pub description: Option<String>,
    pub price: i64, // currency-agnostic integer units, never negative
    pub location: Option<String>,
    pub images: Vec<String>, // public URLs, ordered
    pub status: ListingStatus,
    pub is_premium: bool,
    pub rejected_reason: Option<String>, // set iff status == rejected
    pub views_count: i64,
    pub expires_at: Option<DateTime<Utc>>, // non-null iff active; frozen once expired
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewListing {
    pub category_id: Id,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub location: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Owner edit payload. Any edit forces the listing back through review.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateListing {
    pub category_id: Option<Id>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub location: Option<String>,
    pub images: Option<Vec<String>>,
}

/// Admin snapshot row: listing plus owner/category names resolved in one
/// batched fetch (no per-row profile lookups).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ListingOverview {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub listing: Listing,
    pub owner_name: Option<String>,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "profile_status", rename_all = "lowercase")]
pub enum ProfileStatus {
    Active,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Profile {
    pub user_id: Id,
    pub display_name: String,
    pub phone: Option<String>,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    User,
    Premium,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct UserRole {
    pub user_id: Id,
    pub role: Role,
    pub premium_until: Option<DateTime<Utc>>,
}

impl UserRole {
    /// Premium privileges are a time-bounded grant: the stored role alone is
    /// not enough, `premium_until` is checked live. Admins always qualify.
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Premium => self.premium_until.map(|t| t > now).unwrap_or(false),
            Role::User => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub listing_count: i64, // denormalized; maintained on listing create/delete
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Partner {
    pub id: Id,
    pub name: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub telegram_url: Option<String>,
    pub instagram_url: Option<String>,
    pub facebook_url: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPartner {
    pub name: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub telegram_url: Option<String>,
    pub instagram_url: Option<String>,
    pub facebook_url: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePartner {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub telegram_url: Option<String>,
    pub instagram_url: Option<String>,
    pub facebook_url: Option<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Banner {
    pub id: Id,
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub position: String, // "header" unless stated otherwise
    pub expires_at: Option<DateTime<Utc>>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewBanner {
    pub title: String,
    pub image_url: String,
    pub link_url: Option<String>,
    pub position: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateBanner {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub link_url: Option<String>,
    pub position: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminStats {
    pub total_users: i64,
    pub premium_users: i64,
    pub pending_listings: i64,
    pub active_listings: i64,
    pub blocked_users: i64,
}
