use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ListingRepo: Send + Sync {
    /// Insert a new listing in `pending` status and bump the category's
    /// denormalized listing_count in the same unit of work.
    async fn create_listing(&self, owner: Id, new: NewListing) -> RepoResult<Listing>;
    async fn get_listing(&self, id: Id) -> RepoResult<Listing>;
    /// Publicly visible listings: active only, premium first, newest first.
    async fn list_active(&self, category: Option<Id>) -> RepoResult<Vec<Listing>>;
    async fn list_by_owner(&self, owner: Id) -> RepoResult<Vec<Listing>>;
    /// Admin snapshot with owner/category names joined in one batched fetch.
    async fn list_overview(&self, status: Option<ListingStatus>) -> RepoResult<Vec<ListingOverview>>;
    /// Owner edit. Guarded on `status IN (pending, rejected)`; always resets
    /// status to pending and clears rejected_reason. `Conflict` when the
    /// listing is active or expired.
    async fn resubmit_listing(&self, id: Id, owner: Id, upd: UpdateListing) -> RepoResult<Listing>;
    /// Atomic guarded flip pending -> active. `Conflict` when the row exists
    /// but is no longer pending.
    async fn approve_listing(&self, id: Id, is_premium: bool, expires_at: DateTime<Utc>) -> RepoResult<Listing>;
    /// Atomic guarded flip pending -> rejected with a reason.
    async fn reject_listing(&self, id: Id, reason: String) -> RepoResult<Listing>;
    /// Set expires_at = max(current, floor) + extra_days and revive to
    /// active. Guarded on expires_at being present.
    async fn extend_listing(&self, id: Id, floor: DateTime<Utc>, extra_days: i64) -> RepoResult<Listing>;
    async fn increment_views(&self, id: Id) -> RepoResult<()>;
    /// Lapse sweep: flip every active listing past its expiry to expired.
    /// Returns the affected ids.
    async fn lapse_listings(&self, now: DateTime<Utc>) -> RepoResult<Vec<Id>>;
    /// Expired listings whose expiry is older than `cutoff` (grace elapsed).
    async fn reclaimable_listings(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Listing>>;
    /// Permanent delete; decrements the category count. Ok(false) when the
    /// row was already gone (idempotent re-delete).
    async fn delete_listing(&self, id: Id) -> RepoResult<bool>;
    async fn count_listings(&self, status: ListingStatus) -> RepoResult<i64>;
}

#[async_trait]
pub trait RoleRepo: Send + Sync {
    async fn get_user_role(&self, user_id: Id) -> RepoResult<Option<UserRole>>;
    async fn get_user_roles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, UserRole>>;
    async fn set_role(&self, user_id: Id, role: Role, premium_until: Option<DateTime<Utc>>) -> RepoResult<()>;
    async fn count_premium(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn upsert_profile(&self, profile: Profile) -> RepoResult<()>;
    async fn get_profile(&self, user_id: Id) -> RepoResult<Option<Profile>>;
    async fn get_profiles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, Profile>>;
    async fn list_profiles(&self) -> RepoResult<Vec<Profile>>;
    async fn set_profile_status(&self, user_id: Id, status: ProfileStatus) -> RepoResult<()>;
    async fn count_profiles(&self) -> RepoResult<i64>;
    async fn count_blocked(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category>;
    /// `Conflict` while the category still has listings.
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PartnerRepo: Send + Sync {
    async fn list_partners(&self) -> RepoResult<Vec<Partner>>;
    async fn create_partner(&self, new: NewPartner) -> RepoResult<Partner>;
    async fn update_partner(&self, id: Id, upd: UpdatePartner) -> RepoResult<Partner>;
    async fn delete_partner(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait BannerRepo: Send + Sync {
    async fn list_banners(&self) -> RepoResult<Vec<Banner>>;
    async fn create_banner(&self, new: NewBanner) -> RepoResult<Banner>;
    async fn update_banner(&self, id: Id, upd: UpdateBanner) -> RepoResult<Banner>;
    async fn delete_banner(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo:
    ListingRepo + RoleRepo + ProfileRepo + CategoryRepo + PartnerRepo + BannerRepo
{
}

impl<T> Repo for T where
    T: ListingRepo + RoleRepo + ProfileRepo + CategoryRepo + PartnerRepo + BannerRepo
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        listings: HashMap<Id, Listing>,
        profiles: HashMap<Id, Profile>,
        roles: HashMap<Id, UserRole>,
        categories: HashMap<Id, Category>,
        partners: HashMap<Id, Partner>,
        banners: HashMap<Id, Banner>,
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn sort_listings(v: &mut [Listing]) {
        // premium first, then newest
        v.sort_by(|a, b| {
            b.is_premium
                .cmp(&a.is_premium)
                .then(b.created_at.cmp(&a.created_at))
        });
    }

    #[async_trait]
    impl ListingRepo for InMemRepo {
        async fn create_listing(&self, owner: Id, new: NewListing) -> RepoResult<Listing> {
            let mut s = self.state.write().unwrap();
            if !s.categories.contains_key(&new.category_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let listing = Listing {
                id: Id::new_v4(),
                user_id: owner,
                category_id: new.category_id,
                title: new.title,
                description: new.description,
                price: new.price,
                location: new.location,
                images: new.images,
                status: ListingStatus::Pending,
                is_premium: false,
                rejected_reason: None,
                views_count: 0,
                expires_at: None,
                created_at: now,
                updated_at: now,
            };
            if let Some(cat) = s.categories.get_mut(&new.category_id) {
                cat.listing_count += 1;
            }
            s.listings.insert(listing.id, listing.clone());
            Ok(listing)
        }

        async fn get_listing(&self, id: Id) -> RepoResult<Listing> {
            let s = self.state.read().unwrap();
            s.listings.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_active(&self, category: Option<Id>) -> RepoResult<Vec<Listing>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .listings
                .values()
                .filter(|l| l.status == ListingStatus::Active)
                .filter(|l| category.map(|c| l.category_id == c).unwrap_or(true))
                .cloned()
                .collect();
            sort_listings(&mut v);
            Ok(v)
        }

        async fn list_by_owner(&self, owner: Id) -> RepoResult<Vec<Listing>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .listings
                .values()
                .filter(|l| l.user_id == owner)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn list_overview(&self, status: Option<ListingStatus>) -> RepoResult<Vec<ListingOverview>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .listings
                .values()
                .filter(|l| status.map(|st| l.status == st).unwrap_or(true))
                .cloned()
                .map(|listing| {
                    let owner_name = s
                        .profiles
                        .get(&listing.user_id)
                        .map(|p| p.display_name.clone());
                    let category_name = s
                        .categories
                        .get(&listing.category_id)
                        .map(|c| c.name.clone());
                    ListingOverview { listing, owner_name, category_name }
                })
                .collect();
            v.sort_by(|a, b| b.listing.created_at.cmp(&a.listing.created_at));
            Ok(v)
        }

        async fn resubmit_listing(&self, id: Id, owner: Id, upd: UpdateListing) -> RepoResult<Listing> {
            let mut s = self.state.write().unwrap();
            // validate the new category before taking the mutable borrow
            if let Some(cat) = upd.category_id {
                if !s.categories.contains_key(&cat) {
                    return Err(RepoError::NotFound);
                }
            }
            let listing = s.listings.get(&id).ok_or(RepoError::NotFound)?;
            if listing.user_id != owner {
                return Err(RepoError::NotFound);
            }
            if !matches!(listing.status, ListingStatus::Pending | ListingStatus::Rejected) {
                return Err(RepoError::Conflict);
            }
            let old_category = listing.category_id;
            let listing = s.listings.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(cat) = upd.category_id {
                listing.category_id = cat;
            }
            if let Some(title) = upd.title {
                listing.title = title;
            }
            if let Some(desc) = upd.description {
                listing.description = Some(desc);
            }
            if let Some(price) = upd.price {
                listing.price = price;
            }
            if let Some(loc) = upd.location {
                listing.location = Some(loc);
            }
            if let Some(images) = upd.images {
                listing.images = images;
            }
            listing.status = ListingStatus::Pending;
            listing.rejected_reason = None;
            listing.expires_at = None;
            listing.updated_at = Utc::now();
            let new_category = listing.category_id;
            let updated = listing.clone();
            if new_category != old_category {
                if let Some(c) = s.categories.get_mut(&old_category) {
                    c.listing_count -= 1;
                }
                if let Some(c) = s.categories.get_mut(&new_category) {
                    c.listing_count += 1;
                }
            }
            Ok(updated)
        }

        async fn approve_listing(&self, id: Id, is_premium: bool, expires_at: DateTime<Utc>) -> RepoResult<Listing> {
            let mut s = self.state.write().unwrap();
            let listing = s.listings.get_mut(&id).ok_or(RepoError::NotFound)?;
            if listing.status != ListingStatus::Pending {
                return Err(RepoError::Conflict);
            }
            listing.status = ListingStatus::Active;
            listing.is_premium = is_premium;
            listing.expires_at = Some(expires_at);
            listing.rejected_reason = None;
            listing.updated_at = Utc::now();
            Ok(listing.clone())
        }

        async fn reject_listing(&self, id: Id, reason: String) -> RepoResult<Listing> {
            let mut s = self.state.write().unwrap();
            let listing = s.listings.get_mut(&id).ok_or(RepoError::NotFound)?;
            if listing.status != ListingStatus::Pending {
                return Err(RepoError::Conflict);
            }
            listing.status = ListingStatus::Rejected;
            listing.rejected_reason = Some(reason);
            listing.expires_at = None;
            listing.updated_at = Utc::now();
            Ok(listing.clone())
        }

        async fn extend_listing(&self, id: Id, floor: DateTime<Utc>, extra_days: i64) -> RepoResult<Listing> {
            let mut s = self.state.write().unwrap();
            let listing = s.listings.get_mut(&id).ok_or(RepoError::NotFound)?;
            let Some(current) = listing.expires_at else {
                return Err(RepoError::Conflict);
            };
            let extension = chrono::Duration::try_days(extra_days)
                .ok_or_else(|| RepoError::Internal("extension days out of range".into()))?;
            let base = current.max(floor);
            listing.expires_at = Some(base + extension);
            listing.status = ListingStatus::Active;
            listing.updated_at = Utc::now();
            Ok(listing.clone())
        }

        async fn increment_views(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let listing = s.listings.get_mut(&id).ok_or(RepoError::NotFound)?;
            listing.views_count += 1;
            Ok(())
        }

        async fn lapse_listings(&self, now: DateTime<Utc>) -> RepoResult<Vec<Id>> {
            let mut s = self.state.write().unwrap();
            let mut lapsed = Vec::new();
            for listing in s.listings.values_mut() {
                if listing.status == ListingStatus::Active
                    && listing.expires_at.map(|t| t < now).unwrap_or(false)
                {
                    listing.status = ListingStatus::Expired;
                    listing.updated_at = now;
                    lapsed.push(listing.id);
                }
            }
            Ok(lapsed)
        }

        async fn reclaimable_listings(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Listing>> {
            let s = self.state.read().unwrap();
            Ok(s.listings
                .values()
                .filter(|l| {
                    l.status == ListingStatus::Expired
                        && l.expires_at.map(|t| t < cutoff).unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn delete_listing(&self, id: Id) -> RepoResult<bool> {
            let mut s = self.state.write().unwrap();
            let Some(listing) = s.listings.remove(&id) else {
                return Ok(false);
            };
            if let Some(cat) = s.categories.get_mut(&listing.category_id) {
                cat.listing_count = (cat.listing_count - 1).max(0);
            }
            Ok(true)
        }

        async fn count_listings(&self, status: ListingStatus) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.listings.values().filter(|l| l.status == status).count() as i64)
        }
    }

    #[async_trait]
    impl RoleRepo for InMemRepo {
        async fn get_user_role(&self, user_id: Id) -> RepoResult<Option<UserRole>> {
            let s = self.state.read().unwrap();
            Ok(s.roles.get(&user_id).cloned())
        }

        async fn get_user_roles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, UserRole>> {
            let s = self.state.read().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| s.roles.get(id).cloned().map(|r| (*id, r)))
                .collect())
        }

        async fn set_role(&self, user_id: Id, role: Role, premium_until: Option<DateTime<Utc>>) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.roles.insert(user_id, UserRole { user_id, role, premium_until });
            Ok(())
        }

        async fn count_premium(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.roles.values().filter(|r| r.role == Role::Premium).count() as i64)
        }
    }

    #[async_trait]
    impl ProfileRepo for InMemRepo {
        async fn upsert_profile(&self, profile: Profile) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.profiles.insert(profile.user_id, profile);
            Ok(())
        }

        async fn get_profile(&self, user_id: Id) -> RepoResult<Option<Profile>> {
            let s = self.state.read().unwrap();
            Ok(s.profiles.get(&user_id).cloned())
        }

        async fn get_profiles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, Profile>> {
            let s = self.state.read().unwrap();
            Ok(ids
                .iter()
                .filter_map(|id| s.profiles.get(id).cloned().map(|p| (*id, p)))
                .collect())
        }

        async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.profiles.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn set_profile_status(&self, user_id: Id, status: ProfileStatus) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let p = s.profiles.get_mut(&user_id).ok_or(RepoError::NotFound)?;
            p.status = status;
            Ok(())
        }

        async fn count_profiles(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.profiles.len() as i64)
        }

        async fn count_blocked(&self) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.profiles
                .values()
                .filter(|p| p.status == ProfileStatus::Blocked)
                .count() as i64)
        }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.categories.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            if s.categories.values().any(|c| c.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let cat = Category {
                id: Id::new_v4(),
                name: new.name,
                slug: new.slug,
                icon: new.icon,
                listing_count: 0,
                created_at: Utc::now(),
            };
            s.categories.insert(cat.id, cat.clone());
            Ok(cat)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            if let Some(ref slug) = upd.slug {
                if s.categories.values().any(|c| c.slug == *slug && c.id != id) {
                    return Err(RepoError::Conflict);
                }
            }
            let cat = s.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name {
                cat.name = name;
            }
            if let Some(slug) = upd.slug {
                cat.slug = slug;
            }
            if let Some(icon) = upd.icon {
                cat.icon = Some(icon);
            }
            Ok(cat.clone())
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let cat = s.categories.get(&id).ok_or(RepoError::NotFound)?;
            if cat.listing_count > 0 {
                return Err(RepoError::Conflict);
            }
            s.categories.remove(&id);
            Ok(())
        }
    }

    #[async_trait]
    impl PartnerRepo for InMemRepo {
        async fn list_partners(&self) -> RepoResult<Vec<Partner>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.partners.values().cloned().collect();
            v.sort_by_key(|p| p.sort_order);
            Ok(v)
        }

        async fn create_partner(&self, new: NewPartner) -> RepoResult<Partner> {
            let mut s = self.state.write().unwrap();
            let partner = Partner {
                id: Id::new_v4(),
                name: new.name,
                logo_url: new.logo_url,
                website_url: new.website_url,
                telegram_url: new.telegram_url,
                instagram_url: new.instagram_url,
                facebook_url: new.facebook_url,
                sort_order: new.sort_order,
            };
            s.partners.insert(partner.id, partner.clone());
            Ok(partner)
        }

        async fn update_partner(&self, id: Id, upd: UpdatePartner) -> RepoResult<Partner> {
            let mut s = self.state.write().unwrap();
            let p = s.partners.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name {
                p.name = name;
            }
            if let Some(v) = upd.logo_url {
                p.logo_url = Some(v);
            }
            if let Some(v) = upd.website_url {
                p.website_url = Some(v);
            }
            if let Some(v) = upd.telegram_url {
                p.telegram_url = Some(v);
            }
            if let Some(v) = upd.instagram_url {
                p.instagram_url = Some(v);
            }
            if let Some(v) = upd.facebook_url {
                p.facebook_url = Some(v);
            }
            if let Some(v) = upd.sort_order {
                p.sort_order = v;
            }
            Ok(p.clone())
        }

        async fn delete_partner(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.partners.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl BannerRepo for InMemRepo {
        async fn list_banners(&self) -> RepoResult<Vec<Banner>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.banners.values().cloned().collect();
            v.sort_by_key(|b| b.sort_order);
            Ok(v)
        }

        async fn create_banner(&self, new: NewBanner) -> RepoResult<Banner> {
            let mut s = self.state.write().unwrap();
            let banner = Banner {
                id: Id::new_v4(),
                title: new.title,
                image_url: new.image_url,
                link_url: new.link_url,
                position: new.position.unwrap_or_else(|| "header".into()),
                expires_at: new.expires_at,
                sort_order: new.sort_order,
            };
            s.banners.insert(banner.id, banner.clone());
            Ok(banner)
        }

        async fn update_banner(&self, id: Id, upd: UpdateBanner) -> RepoResult<Banner> {
            let mut s = self.state.write().unwrap();
            let b = s.banners.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(v) = upd.title {
                b.title = v;
            }
            if let Some(v) = upd.image_url {
                b.image_url = v;
            }
            if let Some(v) = upd.link_url {
                b.link_url = Some(v);
            }
            if let Some(v) = upd.position {
                b.position = v;
            }
            if let Some(v) = upd.expires_at {
                b.expires_at = Some(v);
            }
            if let Some(v) = upd.sort_order {
                b.sort_order = v;
            }
            Ok(b.clone())
        }

        async fn delete_banner(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.banners.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const LISTING_COLS: &str = "id, user_id, category_id, title, description, price, location, images, status, is_premium, rejected_reason, views_count, expires_at, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        fn internal(e: sqlx::Error) -> RepoError {
            RepoError::Internal(e.to_string())
        }

        /// Disambiguate a guarded UPDATE that matched no row: the listing is
        /// either gone (NotFound) or present in a disallowed state (Conflict).
        async fn guard_failure(&self, id: Id) -> RepoError {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);
            if exists > 0 {
                RepoError::Conflict
            } else {
                RepoError::NotFound
            }
        }
    }

    #[async_trait]
    impl ListingRepo for PgRepo {
        async fn create_listing(&self, owner: Id, new: NewListing) -> RepoResult<Listing> {
            let mut tx = self.pool.begin().await.map_err(Self::internal)?;
            let bumped = sqlx::query("UPDATE categories SET listing_count = listing_count + 1 WHERE id = $1")
                .bind(new.category_id)
                .execute(&mut *tx)
                .await
                .map_err(Self::internal)?;
            if bumped.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            let listing = sqlx::query_as::<_, Listing>(&format!(
                "INSERT INTO listings (id, user_id, category_id, title, description, price, location, images) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {LISTING_COLS}"
            ))
            .bind(Id::new_v4())
            .bind(owner)
            .bind(new.category_id)
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.price)
            .bind(&new.location)
            .bind(&new.images)
            .fetch_one(&mut *tx)
            .await
            .map_err(Self::internal)?;
            tx.commit().await.map_err(Self::internal)?;
            Ok(listing)
        }

        async fn get_listing(&self, id: Id) -> RepoResult<Listing> {
            sqlx::query_as::<_, Listing>(&format!("SELECT {LISTING_COLS} FROM listings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_active(&self, category: Option<Id>) -> RepoResult<Vec<Listing>> {
            sqlx::query_as::<_, Listing>(&format!(
                "SELECT {LISTING_COLS} FROM listings \
                 WHERE status = 'active' AND ($1::uuid IS NULL OR category_id = $1) \
                 ORDER BY is_premium DESC, created_at DESC"
            ))
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn list_by_owner(&self, owner: Id) -> RepoResult<Vec<Listing>> {
            sqlx::query_as::<_, Listing>(&format!(
                "SELECT {LISTING_COLS} FROM listings WHERE user_id = $1 ORDER BY created_at DESC"
            ))
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn list_overview(&self, status: Option<ListingStatus>) -> RepoResult<Vec<ListingOverview>> {
            // single batched join, no per-row profile fetches
            sqlx::query_as::<_, ListingOverview>(
                "SELECT l.id, l.user_id, l.category_id, l.title, l.description, l.price, l.location, \
                        l.images, l.status, l.is_premium, l.rejected_reason, l.views_count, \
                        l.expires_at, l.created_at, l.updated_at, \
                        p.display_name AS owner_name, c.name AS category_name \
                 FROM listings l \
                 LEFT JOIN profiles p ON p.user_id = l.user_id \
                 LEFT JOIN categories c ON c.id = l.category_id \
                 WHERE ($1::listing_status IS NULL OR l.status = $1) \
                 ORDER BY l.created_at DESC",
            )
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn resubmit_listing(&self, id: Id, owner: Id, upd: UpdateListing) -> RepoResult<Listing> {
            let mut tx = self.pool.begin().await.map_err(Self::internal)?;
            let before = sqlx::query_scalar::<_, Id>("SELECT category_id FROM listings WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::internal)?
                .ok_or(RepoError::NotFound)?;
            let listing = sqlx::query_as::<_, Listing>(&format!(
                "UPDATE listings SET \
                    category_id = COALESCE($3, category_id), \
                    title = COALESCE($4, title), \
                    description = COALESCE($5, description), \
                    price = COALESCE($6, price), \
                    location = COALESCE($7, location), \
                    images = COALESCE($8, images), \
                    status = 'pending', rejected_reason = NULL, expires_at = NULL, \
                    updated_at = now() \
                 WHERE id = $1 AND user_id = $2 AND status IN ('pending', 'rejected') \
                 RETURNING {LISTING_COLS}"
            ))
            .bind(id)
            .bind(owner)
            .bind(upd.category_id)
            .bind(&upd.title)
            .bind(&upd.description)
            .bind(upd.price)
            .bind(&upd.location)
            .bind(&upd.images)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Self::internal)?
            .ok_or(RepoError::Conflict)?;
            if listing.category_id != before {
                sqlx::query("UPDATE categories SET listing_count = GREATEST(listing_count - 1, 0) WHERE id = $1")
                    .bind(before)
                    .execute(&mut *tx)
                    .await
                    .map_err(Self::internal)?;
                let bumped = sqlx::query("UPDATE categories SET listing_count = listing_count + 1 WHERE id = $1")
                    .bind(listing.category_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Self::internal)?;
                if bumped.rows_affected() == 0 {
                    return Err(RepoError::NotFound);
                }
            }
            tx.commit().await.map_err(Self::internal)?;
            Ok(listing)
        }

        async fn approve_listing(&self, id: Id, is_premium: bool, expires_at: DateTime<Utc>) -> RepoResult<Listing> {
            let row = sqlx::query_as::<_, Listing>(&format!(
                "UPDATE listings SET status = 'active', is_premium = $2, expires_at = $3, \
                    rejected_reason = NULL, updated_at = now() \
                 WHERE id = $1 AND status = 'pending' RETURNING {LISTING_COLS}"
            ))
            .bind(id)
            .bind(is_premium)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)?;
            match row {
                Some(l) => Ok(l),
                None => Err(self.guard_failure(id).await),
            }
        }

        async fn reject_listing(&self, id: Id, reason: String) -> RepoResult<Listing> {
            let row = sqlx::query_as::<_, Listing>(&format!(
                "UPDATE listings SET status = 'rejected', rejected_reason = $2, \
                    expires_at = NULL, updated_at = now() \
                 WHERE id = $1 AND status = 'pending' RETURNING {LISTING_COLS}"
            ))
            .bind(id)
            .bind(&reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)?;
            match row {
                Some(l) => Ok(l),
                None => Err(self.guard_failure(id).await),
            }
        }

        async fn extend_listing(&self, id: Id, floor: DateTime<Utc>, extra_days: i64) -> RepoResult<Listing> {
            let extra_days = i32::try_from(extra_days)
                .map_err(|_| RepoError::Internal("extension days out of range".into()))?;
            let row = sqlx::query_as::<_, Listing>(&format!(
                "UPDATE listings SET \
                    expires_at = GREATEST(expires_at, $2) + make_interval(days => $3), \
                    status = 'active', updated_at = now() \
                 WHERE id = $1 AND expires_at IS NOT NULL RETURNING {LISTING_COLS}"
            ))
            .bind(id)
            .bind(floor)
            .bind(extra_days)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)?;
            match row {
                Some(l) => Ok(l),
                None => Err(self.guard_failure(id).await),
            }
        }

        async fn increment_views(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE listings SET views_count = views_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn lapse_listings(&self, now: DateTime<Utc>) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar::<_, Id>(
                "UPDATE listings SET status = 'expired', updated_at = now() \
                 WHERE status = 'active' AND expires_at < $1 RETURNING id",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn reclaimable_listings(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Listing>> {
            sqlx::query_as::<_, Listing>(&format!(
                "SELECT {LISTING_COLS} FROM listings WHERE status = 'expired' AND expires_at < $1"
            ))
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn delete_listing(&self, id: Id) -> RepoResult<bool> {
            let mut tx = self.pool.begin().await.map_err(Self::internal)?;
            let category = sqlx::query_scalar::<_, Id>("DELETE FROM listings WHERE id = $1 RETURNING category_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Self::internal)?;
            let Some(category) = category else {
                return Ok(false);
            };
            sqlx::query("UPDATE categories SET listing_count = GREATEST(listing_count - 1, 0) WHERE id = $1")
                .bind(category)
                .execute(&mut *tx)
                .await
                .map_err(Self::internal)?;
            tx.commit().await.map_err(Self::internal)?;
            Ok(true)
        }

        async fn count_listings(&self, status: ListingStatus) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE status = $1")
                .bind(status)
                .fetch_one(&self.pool)
                .await
                .map_err(Self::internal)
        }
    }

    #[async_trait]
    impl RoleRepo for PgRepo {
        async fn get_user_role(&self, user_id: Id) -> RepoResult<Option<UserRole>> {
            sqlx::query_as::<_, UserRole>("SELECT user_id, role, premium_until FROM user_roles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::internal)
        }

        async fn get_user_roles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, UserRole>> {
            let rows = sqlx::query_as::<_, UserRole>(
                "SELECT user_id, role, premium_until FROM user_roles WHERE user_id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(rows.into_iter().map(|r| (r.user_id, r)).collect())
        }

        async fn set_role(&self, user_id: Id, role: Role, premium_until: Option<DateTime<Utc>>) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role, premium_until) VALUES ($1,$2,$3) \
                 ON CONFLICT (user_id) DO UPDATE SET role = $2, premium_until = $3",
            )
            .bind(user_id)
            .bind(role)
            .bind(premium_until)
            .execute(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(())
        }

        async fn count_premium(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_roles WHERE role = 'premium'")
                .fetch_one(&self.pool)
                .await
                .map_err(Self::internal)
        }
    }

    #[async_trait]
    impl ProfileRepo for PgRepo {
        async fn upsert_profile(&self, profile: Profile) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO profiles (user_id, display_name, phone, status, created_at) \
                 VALUES ($1,$2,$3,$4,$5) \
                 ON CONFLICT (user_id) DO UPDATE SET display_name = $2, phone = $3, status = $4",
            )
            .bind(profile.user_id)
            .bind(&profile.display_name)
            .bind(&profile.phone)
            .bind(profile.status)
            .bind(profile.created_at)
            .execute(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(())
        }

        async fn get_profile(&self, user_id: Id) -> RepoResult<Option<Profile>> {
            sqlx::query_as::<_, Profile>(
                "SELECT user_id, display_name, phone, status, created_at FROM profiles WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn get_profiles(&self, ids: &[Id]) -> RepoResult<HashMap<Id, Profile>> {
            let rows = sqlx::query_as::<_, Profile>(
                "SELECT user_id, display_name, phone, status, created_at FROM profiles WHERE user_id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)?;
            Ok(rows.into_iter().map(|p| (p.user_id, p)).collect())
        }

        async fn list_profiles(&self) -> RepoResult<Vec<Profile>> {
            sqlx::query_as::<_, Profile>(
                "SELECT user_id, display_name, phone, status, created_at FROM profiles ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn set_profile_status(&self, user_id: Id, status: ProfileStatus) -> RepoResult<()> {
            let res = sqlx::query("UPDATE profiles SET status = $2 WHERE user_id = $1")
                .bind(user_id)
                .bind(status)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn count_profiles(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
                .fetch_one(&self.pool)
                .await
                .map_err(Self::internal)
        }

        async fn count_blocked(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE status = 'blocked'")
                .fetch_one(&self.pool)
                .await
                .map_err(Self::internal)
        }
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            sqlx::query_as::<_, Category>(
                "SELECT id, name, slug, icon, listing_count, created_at FROM categories ORDER BY name",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "INSERT INTO categories (id, name, slug, icon) VALUES ($1,$2,$3,$4) \
                 RETURNING id, name, slug, icon, listing_count, created_at",
            )
            .bind(Id::new_v4())
            .bind(&new.name)
            .bind(&new.slug)
            .bind(&new.icon)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| RepoError::Conflict)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "UPDATE categories SET name = COALESCE($2, name), slug = COALESCE($3, slug), \
                    icon = COALESCE($4, icon) \
                 WHERE id = $1 RETURNING id, name, slug, icon, listing_count, created_at",
            )
            .bind(id)
            .bind(&upd.name)
            .bind(&upd.slug)
            .bind(&upd.icon)
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| RepoError::Conflict)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            // referential-integrity guard: refuse while listings remain
            let res = sqlx::query("DELETE FROM categories WHERE id = $1 AND listing_count = 0")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            if res.rows_affected() == 0 {
                let exists =
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE id = $1")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(Self::internal)?;
                return Err(if exists > 0 { RepoError::Conflict } else { RepoError::NotFound });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PartnerRepo for PgRepo {
        async fn list_partners(&self) -> RepoResult<Vec<Partner>> {
            sqlx::query_as::<_, Partner>(
                "SELECT id, name, logo_url, website_url, telegram_url, instagram_url, facebook_url, sort_order \
                 FROM partners ORDER BY sort_order",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn create_partner(&self, new: NewPartner) -> RepoResult<Partner> {
            sqlx::query_as::<_, Partner>(
                "INSERT INTO partners (id, name, logo_url, website_url, telegram_url, instagram_url, facebook_url, sort_order) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8) \
                 RETURNING id, name, logo_url, website_url, telegram_url, instagram_url, facebook_url, sort_order",
            )
            .bind(Id::new_v4())
            .bind(&new.name)
            .bind(&new.logo_url)
            .bind(&new.website_url)
            .bind(&new.telegram_url)
            .bind(&new.instagram_url)
            .bind(&new.facebook_url)
            .bind(new.sort_order)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn update_partner(&self, id: Id, upd: UpdatePartner) -> RepoResult<Partner> {
            sqlx::query_as::<_, Partner>(
                "UPDATE partners SET name = COALESCE($2, name), logo_url = COALESCE($3, logo_url), \
                    website_url = COALESCE($4, website_url), telegram_url = COALESCE($5, telegram_url), \
                    instagram_url = COALESCE($6, instagram_url), facebook_url = COALESCE($7, facebook_url), \
                    sort_order = COALESCE($8, sort_order) \
                 WHERE id = $1 \
                 RETURNING id, name, logo_url, website_url, telegram_url, instagram_url, facebook_url, sort_order",
            )
            .bind(id)
            .bind(&upd.name)
            .bind(&upd.logo_url)
            .bind(&upd.website_url)
            .bind(&upd.telegram_url)
            .bind(&upd.instagram_url)
            .bind(&upd.facebook_url)
            .bind(upd.sort_order)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_partner(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM partners WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BannerRepo for PgRepo {
        async fn list_banners(&self) -> RepoResult<Vec<Banner>> {
            sqlx::query_as::<_, Banner>(
                "SELECT id, title, image_url, link_url, position, expires_at, sort_order \
                 FROM banners ORDER BY sort_order",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn create_banner(&self, new: NewBanner) -> RepoResult<Banner> {
            sqlx::query_as::<_, Banner>(
                "INSERT INTO banners (id, title, image_url, link_url, position, expires_at, sort_order) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) \
                 RETURNING id, title, image_url, link_url, position, expires_at, sort_order",
            )
            .bind(Id::new_v4())
            .bind(&new.title)
            .bind(&new.image_url)
            .bind(&new.link_url)
            .bind(new.position.as_deref().unwrap_or("header"))
            .bind(new.expires_at)
            .bind(new.sort_order)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::internal)
        }

        async fn update_banner(&self, id: Id, upd: UpdateBanner) -> RepoResult<Banner> {
            sqlx::query_as::<_, Banner>(
                "UPDATE banners SET title = COALESCE($2, title), image_url = COALESCE($3, image_url), \
                    link_url = COALESCE($4, link_url), position = COALESCE($5, position), \
                    expires_at = COALESCE($6, expires_at), sort_order = COALESCE($7, sort_order) \
                 WHERE id = $1 \
                 RETURNING id, title, image_url, link_url, position, expires_at, sort_order",
            )
            .bind(id)
            .bind(&upd.title)
            .bind(&upd.image_url)
            .bind(&upd.link_url)
            .bind(&upd.position)
            .bind(upd.expires_at)
            .bind(upd.sort_order)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_banner(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM banners WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Self::internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }
}
