use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::UpstreamConfig;
use crate::error::ApiError;

// Client request body for POST /describe
#[derive(Debug)]
pub struct DescribeRequest {
    pub image: Option<String>,
}

// Read from a JSON object by key; a non-string "image" counts as absent
impl From<Map<String, Value>> for DescribeRequest {
    fn from(mut fields: Map<String, Value>) -> Self {
        let image = match fields.remove("image") {
            Some(Value::String(image)) => Some(image),
            _ => None,
        };
        Self { image }
    }
}

impl DescribeRequest {
    pub fn validate(self) -> Result<ImagePayload, ApiError> {
        match self.image {
            Some(image) if !image.is_empty() => Ok(ImagePayload(image)),
            _ => Err(ApiError::MissingImage),
        }
    }
}

/// Base64 image that passed validation. Forwarded as-is, never decoded here.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// llama.cpp /completion request format
#[derive(Serialize, Debug)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub n_predict: u32,
    pub image_data: Vec<ImageData<'a>>,
    pub stream: bool,
}

#[derive(Serialize, Debug)]
pub struct ImageData<'a> {
    pub data: &'a str,
    pub id: u32,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(config: &'a UpstreamConfig, image: &'a ImagePayload) -> Self {
        Self {
            prompt: &config.prompt,
            n_predict: config.n_predict,
            image_data: vec![ImageData {
                data: image.as_str(),
                id: config.image_id,
            }],
            stream: true,
        }
    }
}

// One `data: {...}` frame from the completion stream; the rest of the fields are ignored
#[derive(Deserialize, Debug)]
pub struct CompletionChunk {
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_and_empty_image() {
        assert!(matches!(
            DescribeRequest { image: None }.validate(),
            Err(ApiError::MissingImage)
        ));
        assert!(matches!(
            DescribeRequest { image: Some(String::new()) }.validate(),
            Err(ApiError::MissingImage)
        ));
    }

    #[test]
    fn non_string_image_field_is_missing() {
        let fields = match serde_json::json!({ "image": 42, "other": "aGVsbG8=" }) {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        };
        assert!(matches!(
            DescribeRequest::from(fields).validate(),
            Err(ApiError::MissingImage)
        ));
    }

    #[test]
    fn validate_keeps_image_verbatim() {
        let payload = DescribeRequest { image: Some("aGVsbG8=".into()) }
            .validate()
            .expect("valid");
        assert_eq!(payload.as_str(), "aGVsbG8=");
    }

    #[test]
    fn completion_request_wire_format() {
        let config = UpstreamConfig::default();
        let image = DescribeRequest { image: Some("aGVsbG8=".into()) }
            .validate()
            .expect("valid");

        let body = serde_json::to_value(CompletionRequest::new(&config, &image)).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "prompt": "USER:[img-12]Describe the image briefly and accurately.\nASSISTANT:",
                "n_predict": 128,
                "image_data": [{ "data": "aGVsbG8=", "id": 12 }],
                "stream": true
            })
        );
    }
}
