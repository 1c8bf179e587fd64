use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::{Id, Role};
use crate::repo::Repo;

/// JWT payload. Identity only; authorization roles live in the listing
/// store and are checked against it per request, never trusted from the
/// token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub exp: usize,
}

fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`. Missing and invalid credentials
/// both produce the same generic 401.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => {
                    return ready(Err(ApiError::Unauthorized.into()));
                }
            }
        }
        ready(Err(ApiError::Unauthorized.into()))
    }
}

/// Admin gate: the stored role must be `admin`. Checked before any
/// mutation; failure surfaces a generic denial.
pub async fn require_admin(repo: &dyn Repo, user_id: Id) -> Result<(), ApiError> {
    match repo.get_user_role(user_id).await? {
        Some(role) if role.role == Role::Admin => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

/// Create a JWT for a user id. Token issuance normally happens at the
/// identity provider; this helper backs tests and operator tooling.
pub fn create_jwt(user_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims { sub: user_id, exp: expiration };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
