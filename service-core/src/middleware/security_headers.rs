use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;

/// Which paths may be embedded in frames, and by whom.
///
/// Paths starting with one of `framable_prefixes` get a `frame-ancestors`
/// directive listing `ancestors` instead of the default deny policy.
#[derive(Debug, Clone, Default)]
pub struct FramePolicy {
    pub framable_prefixes: Vec<String>,
    pub ancestors: Vec<String>,
}

impl FramePolicy {
    pub fn new(framable_prefixes: Vec<String>, ancestors: Vec<String>) -> Self {
        Self {
            framable_prefixes,
            ancestors,
        }
    }

    fn allows(&self, path: &str) -> bool {
        !self.ancestors.is_empty()
            && self
                .framable_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn content_security_policy(&self) -> String {
        format!(
            "default-src 'none'; frame-ancestors 'self' {}",
            self.ancestors.join(" ")
        )
    }
}

pub async fn security_headers_middleware(
    State(policy): State<Arc<FramePolicy>>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    let framable = policy.allows(req.uri().path());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        header::HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        header::HeaderValue::from_static("no-referrer"),
    );

    let framed_csp = if framable {
        header::HeaderValue::from_str(&policy.content_security_policy()).ok()
    } else {
        None
    };

    match framed_csp {
        // X-Frame-Options cannot express an allow list, so it is left off here
        Some(csp) => {
            headers.insert(header::CONTENT_SECURITY_POLICY, csp);
        }
        None => {
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                header::HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
            );
            headers.insert(
                header::X_FRAME_OPTIONS,
                header::HeaderValue::from_static("DENY"),
            );
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware::from_fn_with_state, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        let policy = Arc::new(FramePolicy::new(
            vec!["/relay".to_string()],
            vec!["https://a.example".to_string(), "https://b.example".to_string()],
        ));
        Router::new()
            .route("/relay/start", get(|| async { "relay" }))
            .route("/health", get(|| async { "ok" }))
            .layer(from_fn_with_state(policy, security_headers_middleware))
    }

    async fn get_headers(uri: &str) -> axum::http::HeaderMap {
        app()
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .headers()
            .clone()
    }

    #[tokio::test]
    async fn test_relay_paths_are_framable_by_ancestors() {
        let headers = get_headers("/relay/start").await;
        assert!(!headers.contains_key(header::X_FRAME_OPTIONS));
        assert_eq!(
            headers[header::CONTENT_SECURITY_POLICY],
            "default-src 'none'; frame-ancestors 'self' https://a.example https://b.example"
        );
    }

    #[tokio::test]
    async fn test_other_paths_deny_framing() {
        let headers = get_headers("/health").await;
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}
