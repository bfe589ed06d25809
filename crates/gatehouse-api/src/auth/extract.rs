// Per-route authentication
// Decision: Verification is opt-in per handler through the `AuthClaims` extractor,
// not a global layer, so public routes never pay for it

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use super::{error::AuthError, verifier::Claims, verifier::TokenVerifier};

/// Claims of the bearer token presented with the current request.
///
/// Lives only for the request it was extracted from.
#[derive(Debug, Clone)]
pub struct AuthClaims(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
    Arc<dyn TokenVerifier>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = <Arc<dyn TokenVerifier>>::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
            .transpose()?;

        let claims = verifier.verify(header_value).inspect_err(|e| {
            tracing::debug!(reason = %e, "Rejected bearer authentication");
        })?;

        Ok(AuthClaims(claims))
    }
}
