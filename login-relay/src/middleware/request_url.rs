//! Reconstructs the absolute URL of the request, honouring reverse-proxy
//! headers, so the ring can be matched against what the browser sees.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;

use crate::models::RequestUrl;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

fn first_header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn request_url(parts: &Parts) -> RequestUrl {
    let scheme = first_header_value(&parts.headers, FORWARDED_PROTO)
        .or_else(|| parts.uri.scheme_str())
        .unwrap_or("http")
        .to_ascii_lowercase();

    let host = first_header_value(&parts.headers, FORWARDED_HOST)
        .or_else(|| first_header_value(&parts.headers, header::HOST.as_str()))
        .or_else(|| parts.uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost")
        .to_ascii_lowercase();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    RequestUrl::new(&format!("{}://{}", scheme, host), path_and_query)
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestUrl
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(request_url(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_host_header() {
        let parts = parts(
            Request::builder()
                .uri("/relay/start?lang=nl")
                .header("host", "a.example:8080")
                .body(())
                .unwrap(),
        );
        let url = request_url(&parts);
        assert_eq!(url.origin, "http://a.example:8080");
        assert_eq!(url.url, "http://a.example:8080/relay/start?lang=nl");
    }

    #[test]
    fn test_forwarded_headers_win() {
        let parts = parts(
            Request::builder()
                .uri("/relay/start")
                .header("host", "internal:8080")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "A.Example, proxy.local")
                .body(())
                .unwrap(),
        );
        assert_eq!(request_url(&parts).origin, "https://a.example");
    }

    #[test]
    fn test_absolute_uri() {
        let parts = parts(
            Request::builder()
                .uri("https://b.example/relay/start")
                .body(())
                .unwrap(),
        );
        assert_eq!(request_url(&parts).url, "https://b.example/relay/start");
    }
}
