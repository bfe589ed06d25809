// Authentication module
// Decision: Bearer tokens for API calls; the session cookie only carries OAuth handshake state

pub mod error;
pub mod extract;
pub mod oauth;
pub mod verifier;

pub use error::AuthError;
pub use extract::AuthClaims;
pub use oauth::{CodeExchange, OAuthHandshake, TokenEndpointExchange};
pub use verifier::{Claims, JwtVerifier, TokenVerifier};
