use crate::models::{
    AdminStats, Banner, Category, Listing, ListingOverview, ListingStatus, NewBanner, NewCategory,
    NewListing, NewPartner, Partner, Profile, ProfileStatus, Role, UpdateBanner, UpdateCategory,
    UpdateListing, UpdatePartner, UserRole,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_listings,
        crate::routes::get_listing,
        crate::routes::create_listing,
        crate::routes::update_listing,
        crate::routes::my_listings,
        crate::routes::auth_me,
        crate::routes::upload_image,
        crate::admin::dispatch,
    ),
    components(schemas(
        Listing, NewListing, UpdateListing, ListingOverview, ListingStatus,
        Category, NewCategory, UpdateCategory,
        Partner, NewPartner, UpdatePartner,
        Banner, NewBanner, UpdateBanner,
        Profile, ProfileStatus, Role, UserRole, AdminStats,
        crate::routes::ImageUploadResponse, crate::routes::MeResponse,
    )),
    tags(
        (name = "listings", description = "Listing lifecycle operations"),
        (name = "admin", description = "Moderation and administrative actions"),
    )
)]
pub struct ApiDoc;
