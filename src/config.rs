use clap::Parser;
use std::time::Duration;

// Prompt sent with every image; [img-12] is the slot llama.cpp fills with image id 12
pub const DEFAULT_PROMPT: &str =
    "USER:[img-12]Describe the image briefly and accurately.\nASSISTANT:";
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8080/completion";
pub const DEFAULT_N_PREDICT: u32 = 128;
pub const DEFAULT_IMAGE_ID: u32 = 12;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "llava-relay")]
#[command(about = "Streams image descriptions from a local LLaVA server")]
pub struct Args {
    // Address to bind on
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 5000, env = "PORT")]
    pub port: u16,

    // llama.cpp completion endpoint
    #[arg(short, long, default_value = DEFAULT_UPSTREAM_URL, env = "LLAVA_URL")]
    pub upstream_url: String,

    // Prompt template, must reference the image slot
    #[arg(long, default_value = DEFAULT_PROMPT, env = "LLAVA_PROMPT")]
    pub prompt: String,

    // Max tokens the model may generate
    #[arg(long, default_value_t = DEFAULT_N_PREDICT, env = "LLAVA_N_PREDICT")]
    pub n_predict: u32,

    // Image slot id used in the prompt
    #[arg(long, default_value_t = DEFAULT_IMAGE_ID, env = "LLAVA_IMAGE_ID")]
    pub image_id: u32,

    // Upstream connect timeout in seconds (none by default)
    #[arg(long, env = "LLAVA_CONNECT_TIMEOUT")]
    pub connect_timeout: Option<u64>,

    // Largest accepted request body; base64 photos get big
    #[arg(long, default_value_t = 32 * 1024 * 1024, env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    // Log filter: trace, debug, info, warn, error
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.upstream_url.clone(),
            prompt: self.prompt.clone(),
            n_predict: self.n_predict,
            image_id: self.image_id,
            connect_timeout: self.connect_timeout.map(Duration::from_secs),
        }
    }
}

/// Immutable settings for talking to the inference server.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub url: String,
    pub prompt: String,
    pub n_predict: u32,
    pub image_id: u32,
    pub connect_timeout: Option<Duration>,
}

impl UpstreamConfig {
    /// The `[img-<id>]` tag llama.cpp replaces with the image embedding.
    pub fn image_slot(&self) -> String {
        format!("[img-{}]", self.image_id)
    }

    pub fn has_image_slot(&self) -> bool {
        self.prompt.contains(&self.image_slot())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            n_predict: DEFAULT_N_PREDICT,
            image_id: DEFAULT_IMAGE_ID,
            connect_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_llama_server() {
        let args = Args::try_parse_from(["llava-relay", "--port", "5000"]).expect("parse");
        let upstream = args.upstream();

        assert_eq!(args.bind_addr(), format!("{}:5000", args.host));
        assert_eq!(upstream.n_predict, 128);
        assert_eq!(upstream.image_id, 12);
        assert_eq!(upstream.connect_timeout, None);
        assert!(upstream.has_image_slot());
    }

    #[test]
    fn overrides_flow_into_upstream_config() {
        let args = Args::try_parse_from([
            "llava-relay",
            "--upstream-url",
            "http://10.0.0.2:9000/completion",
            "--image-id",
            "3",
            "--n-predict",
            "64",
            "--connect-timeout",
            "5",
        ])
        .expect("parse");
        let upstream = args.upstream();

        assert_eq!(upstream.url, "http://10.0.0.2:9000/completion");
        assert_eq!(upstream.n_predict, 64);
        assert_eq!(upstream.connect_timeout, Some(Duration::from_secs(5)));
        // default prompt still points at slot 12
        assert_eq!(upstream.image_slot(), "[img-3]");
        assert!(!upstream.has_image_slot());
    }
}
