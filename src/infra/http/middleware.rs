use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::ErrorReport;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages.join("; ");
        if status.is_server_error() {
            error!(
                target = "infra::http",
                %method,
                uri = %uri,
                status = status.as_u16(),
                request_id = %request_id,
                source,
                detail = %detail,
                elapsed_ms,
                "Request failed"
            );
        } else {
            warn!(
                target = "infra::http",
                %method,
                uri = %uri,
                status = status.as_u16(),
                request_id = %request_id,
                source,
                detail = %detail,
                elapsed_ms,
                "Request rejected"
            );
        }
    } else {
        info!(
            target = "infra::http",
            %method,
            uri = %uri,
            status = status.as_u16(),
            request_id = %request_id,
            elapsed_ms,
            "Request completed"
        );
    }

    response
}
