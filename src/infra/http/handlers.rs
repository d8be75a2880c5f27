use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{RenderRequest, TargetFormat};

use super::AppState;
use super::error::ApiError;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `POST /render`: multipart upload with a `template` file plus optional
/// `data`, `format` and `name` fields. Responds with the rendered artifact as
/// a binary attachment.
pub async fn render_multipart(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut template: Option<Bytes> = None;
    let mut template_name: Option<String> = None;
    let mut data: Option<Value> = None;
    let mut format: Option<TargetFormat> = None;
    let mut report_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        ApiError::bad_request("invalid multipart payload", err.to_string())
    })? {
        let name = field.name().map(|value| value.to_string());
        match name.as_deref() {
            Some("template") => {
                template_name = field.file_name().map(|value| value.to_string());
                template = Some(field.bytes().await.map_err(|err| {
                    ApiError::bad_request("failed to read template upload", err.to_string())
                })?);
            }
            Some("data") => {
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read data field", err.to_string())
                })?;
                if !text.trim().is_empty() {
                    data = Some(serde_json::from_str(&text).map_err(|err| {
                        ApiError::bad_request("data must be valid JSON", err.to_string())
                    })?);
                }
            }
            Some("format") => {
                let text = field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read format field", err.to_string())
                })?;
                format = Some(parse_format(&text)?);
            }
            Some("name") => {
                report_name = Some(field.text().await.map_err(|err| {
                    ApiError::bad_request("failed to read name field", err.to_string())
                })?);
            }
            _ => {}
        }
    }

    // Reject before any workspace exists; a bad request must leave no trace.
    let template = template
        .ok_or_else(|| ApiError::bad_request("template file is required", "bad_request"))?;

    let request = RenderRequest::new(
        template,
        template_name.as_deref(),
        data.unwrap_or(Value::Null),
        format.unwrap_or_default(),
        report_name,
    );

    let document = state.orchestrator.render(request).await?;

    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderBase64Request {
    pub template_base64: Option<String>,
    #[serde(default = "default_data")]
    pub data: Value,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_data() -> Value {
    json!({})
}

#[derive(Debug, Serialize)]
pub struct RenderBase64Response {
    pub success: bool,
    pub data: String,
}

/// `POST /render-base64`: self-contained JSON variant carrying the template
/// as base64. Responds with the rendered artifact as base64.
pub async fn render_base64(
    State(state): State<AppState>,
    body: Result<Json<RenderBase64Request>, JsonRejection>,
) -> Result<Json<RenderBase64Response>, ApiError> {
    // A malformed body must still come back in the standard failure shape,
    // so the extractor rejection is folded into ApiError here instead of
    // falling through to axum's plain-text default.
    let Json(body) =
        body.map_err(|err| ApiError::bad_request("invalid JSON payload", err.body_text()))?;

    let template_base64 = body.template_base64.unwrap_or_default();
    if template_base64.trim().is_empty() {
        return Err(ApiError::bad_request(
            "templateBase64 is required",
            "bad_request",
        ));
    }

    let template = BASE64.decode(template_base64.trim()).map_err(|err| {
        ApiError::bad_request("templateBase64 is not valid base64", err.to_string())
    })?;

    let format = match body.format.as_deref() {
        Some(raw) => parse_format(raw)?,
        None => TargetFormat::default(),
    };

    let request = RenderRequest::new(Bytes::from(template), None, body.data, format, body.name);

    let document = state.orchestrator.render(request).await?;

    Ok(Json(RenderBase64Response {
        success: true,
        data: BASE64.encode(&document.bytes),
    }))
}

fn parse_format(raw: &str) -> Result<TargetFormat, ApiError> {
    TargetFormat::parse(raw)
        .map_err(|err| ApiError::bad_request("unsupported format", err.to_string()))
}
