use crate::error::HttpAppError;
use crate::middleware::audit;
use crate::utils::ip_extraction::extract_client_ip;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use snapboard_core::AppError;
use snapboard_infra::{RateLimitDecision, RateLimitPurpose, RateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;

/// Client address as resolved for rate limiting, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Limit applied to one group of routes.
#[derive(Clone)]
pub struct RouteRateLimit {
    pub limiter: Arc<RateLimiter>,
    pub purpose: RateLimitPurpose,
    pub limit: u32,
    pub trusted_proxy_count: usize,
}

fn set_header(response: &mut Response, name: &'static str, value: impl ToString) {
    if let Ok(header_value) = HeaderValue::from_str(&value.to_string()) {
        response.headers_mut().insert(name, header_value);
    }
}

/// HTTP rate limiting middleware
///
/// Requests are keyed by client IP and counted per purpose, so reads and
/// metadata writes never consume each other's budget.
///
/// # Headers
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `Retry-After`: seconds until a slot frees up (only on 429 responses)
pub async fn rate_limit_middleware(
    State(route): State<RouteRateLimit>,
    mut request: Request,
    next: Next,
) -> Response {
    let socket_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_client_ip(
        request.headers(),
        socket_addr.as_ref(),
        route.trusted_proxy_count,
    );
    request.extensions_mut().insert(ClientIp(ip.clone()));

    match route.limiter.check(&ip, route.limit, route.purpose).await {
        RateLimitDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            set_header(&mut response, "x-ratelimit-limit", route.limit);
            set_header(&mut response, "x-ratelimit-remaining", remaining);
            response
        }
        RateLimitDecision::Rejected { retry_after_secs } => {
            audit::log_rate_limit_exceeded(
                ip,
                request.uri().path().to_string(),
                route.purpose.as_str(),
                route.limit,
            );

            let retry_after_secs = retry_after_secs.max(1);
            let mut response =
                HttpAppError(AppError::RateLimited { retry_after_secs }).into_response();
            set_header(&mut response, "x-ratelimit-limit", route.limit);
            set_header(&mut response, "x-ratelimit-remaining", 0);
            set_header(&mut response, "retry-after", retry_after_secs);
            response
        }
    }
}
