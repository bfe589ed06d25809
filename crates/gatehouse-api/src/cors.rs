// Cross-origin policy
// Decision: Origins are an explicit list and are echoed back, never "*",
// since credentials are allowed
// Decision: "All methods/headers" mirrors the preflight request rather than sending a wildcard
//
// Requests from other origins are not rejected here: they get no allow headers and the
// browser withholds the response. Preflight requests are answered by the layer itself
// and never reach the handlers.

use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let allow_methods = match &config.allowed_methods {
        Some(methods) => AllowMethods::list(methods.iter().cloned()),
        None => AllowMethods::mirror_request(),
    };

    let allow_headers = match &config.allowed_headers {
        Some(headers) => AllowHeaders::list(headers.iter().cloned()),
        None => AllowHeaders::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.allowed_origins.iter().cloned()))
        .allow_methods(allow_methods)
        .allow_headers(allow_headers)
        .allow_credentials(config.allow_credentials)
}
