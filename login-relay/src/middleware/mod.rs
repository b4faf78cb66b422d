pub mod metrics;
pub mod request_url;

pub use metrics::metrics_middleware;
