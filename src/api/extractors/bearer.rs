use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::services::auth::principal::BearerToken;

/// Raw token from `Authorization: Bearer <token>`, unverified.
///
/// A missing, non-UTF-8, non-Bearer or empty header yields `None`; the request then
/// continues as unauthenticated and the identity hook decides what that means.
#[derive(Debug)]
pub struct BearerCredentials(pub Option<BearerToken>);

pub(crate) fn parse_authorization(value: &str) -> Option<BearerToken> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| BearerToken::new(token))
}

impl<S> FromRequestParts<S> for BearerCredentials
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_authorization);
        Ok(BearerCredentials(token))
    }
}
