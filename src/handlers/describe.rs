use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::header,
    response::Response,
};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ApiError;
use crate::metrics::DESCRIBE_REQUESTS;
use crate::models::DescribeRequest;
use crate::relay;
use crate::state::AppState;

/// JSON body of `POST /describe`, with axum's rejections folded into
/// [`ApiError`] so every failure answers with the same `{"error": ...}` shape.
pub struct DescribeBody(pub DescribeRequest);

impl<S> FromRequest<S> for DescribeBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // counted here so rejected requests share the errors' denominator
        DESCRIBE_REQUESTS.inc();

        match Json::<Map<String, Value>>::from_request(req, state).await {
            Ok(Json(fields)) => Ok(DescribeBody(DescribeRequest::from(fields))),
            Err(JsonRejection::MissingJsonContentType(_) | JsonRejection::JsonSyntaxError(_)) => {
                Err(ApiError::InvalidContentType)
            }
            // valid JSON, but not an object
            Err(JsonRejection::JsonDataError(_)) => Err(ApiError::MissingImage),
            Err(other) => Err(ApiError::Internal(other.body_text())),
        }
    }
}

// POST /describe: stream the model's description of one image as plain text
pub async fn describe_handler(
    State(state): State<Arc<AppState>>,
    DescribeBody(payload): DescribeBody,
) -> Result<Response, ApiError> {
    let image = payload.validate()?;
    let upstream = relay::connect(&state.client, &state.upstream, &image).await?;
    let fragments = relay::translate(upstream.bytes_stream());

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(fragments))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
