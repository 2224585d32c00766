use crate::config::UpstreamConfig;

// app's shared state, built once at start-up and never mutated
pub struct AppState {
    pub client: reqwest::Client, // pooled connections to the LLaVA server
    pub upstream: UpstreamConfig,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(upstream: UpstreamConfig, max_body_bytes: usize) -> reqwest::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = upstream.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            upstream,
            max_body_bytes,
        })
    }
}
