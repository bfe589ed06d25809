use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::common::ErrorResponse;

/// Reasons a request fails bearer authentication.
///
/// Every variant is terminal for the request and answered with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingCredential,

    #[error("Invalid authorization header format")]
    MalformedHeader,

    #[error("Invalid authentication scheme")]
    UnsupportedScheme,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = ErrorResponse::new(self.to_string()).with_status(self.status());
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}
