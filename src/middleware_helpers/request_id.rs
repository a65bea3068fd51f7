use crate::tracing::RequestId;
use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

/// Header carrying the correlation id in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn header_name() -> HeaderName {
    HeaderName::from_static(REQUEST_ID_HEADER)
}

/// Picks the caller's id when it is usable, otherwise mints a UUID.
fn resolve_request_id(headers: &HeaderMap) -> (RequestId, HeaderValue) {
    let supplied = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|raw| !raw.is_empty());

    if let Some(raw) = supplied {
        if let Ok(value) = HeaderValue::from_str(raw) {
            return (RequestId::new(raw), value);
        }
    }

    let minted = RequestId::default();
    let value = HeaderValue::from_str(minted.as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    (minted, value)
}

/// Tags the request with an id, scopes it for handlers and error bodies, and
/// returns it in the response headers.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let (request_id, header_value) = resolve_request_id(request.headers());

    request
        .headers_mut()
        .insert(header_name(), header_value.clone());
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "api_call",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = crate::tracing::scope_request_id(request_id, next.run(request))
        .instrument(span)
        .await;
    response
        .headers_mut()
        .insert(header_name(), header_value);
    response
}
