use async_trait::async_trait;
use axum::body::HttpBody;
use axum::extract::{Extension, FromRequest, Json, Path, Query, RequestParts};
use axum::http::header::AUTHORIZATION;
use axum::BoxError;
use serde::de::DeserializeOwned;

use crate::api::{DynAPI, IdentityAPI};
use crate::auth::User;
use crate::error::Error;

fn bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller from the `Authorization: Bearer <token>` header.
#[async_trait]
impl<B> FromRequest<B> for User
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Extension(api) = Extension::<DynAPI>::from_request(req)
            .await
            .map_err(Error::unexpected_error)?;

        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| Error::unauthenticated_error("missing bearer token"))?
            .to_string();

        api.authenticate(&token).await
    }
}

/// A JSON request body. Malformed bodies are rejected as validation errors.
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, B> FromRequest<B> for Payload<T>
where
    T: DeserializeOwned + Send,
    B: HttpBody + Send,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req).await?;

        Ok(Self(value))
    }
}

pub struct PathParam<T>(pub T);

#[async_trait]
impl<T, B> FromRequest<B> for PathParam<T>
where
    T: DeserializeOwned + Send,
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request(req).await?;

        Ok(Self(value))
    }
}

pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, B> FromRequest<B> for QueryParams<T>
where
    T: DeserializeOwned + Send,
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request(req).await?;

        Ok(Self(value))
    }
}

#[test]
fn bearer_token_parsing() {
    assert_eq!(bearer_token("Bearer abc"), Some("abc"));
    assert_eq!(bearer_token("Bearer   "), None);
    assert_eq!(bearer_token("Basic abc"), None);
}
