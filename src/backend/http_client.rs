use reqwest::Client;
use std::time::Duration;

pub fn build_backend_client() -> Client {
    build_backend_client_with_timeout(120)
}

pub fn build_backend_client_with_timeout(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for long-lived streaming responses: no overall timeout, only a
/// connect timeout, so a slow token stream is never cut off mid-answer.
pub fn build_streaming_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}
