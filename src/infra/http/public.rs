use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{
        Method, StatusCode, Uri,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::{
    error::HttpError,
    filters::{FilterService, FilterVerdict},
    render::{RenderService, RenderedResponse},
};

use super::middleware::{ServedDocument, log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub render: Arc<RenderService>,
    pub filters: Arc<FilterService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_engine/health", get(health))
        .fallback(serve_document)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Serve any path as a document: filters first, then the render pipeline.
async fn serve_document(
    State(state): State<HttpState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let origin = match state.render.request_for(uri.path(), method.as_str(), &query) {
        Ok(origin) => origin,
        Err(err) => {
            return HttpError::new(
                "infra::http::serve_document",
                StatusCode::NOT_FOUND,
                "Document not found",
                err.to_string(),
            )
            .into_response();
        }
    };

    match state.filters.before(&origin).await {
        Ok(FilterVerdict::Proceed) => {}
        Ok(FilterVerdict::Halt) => {
            return HttpError::new(
                "infra::http::serve_document",
                StatusCode::FORBIDDEN,
                "Request blocked",
                format!("before filter stopped `{}`", origin.path),
            )
            .into_response();
        }
        Ok(FilterVerdict::Captured(rendered)) => {
            state.filters.after(&origin).await;
            return payload_response(origin.document.as_str(), rendered);
        }
        Err(err) => return err.into_response(),
    }

    let rendered = match state.render.render(&origin).await {
        Ok(rendered) => rendered,
        Err(err) => return err.into_response(),
    };

    state.filters.after(&origin).await;
    payload_response(origin.document.as_str(), rendered)
}

fn payload_response(document: &str, rendered: RenderedResponse) -> Response {
    let cache_control = match rendered.valid_for {
        Some(valid_for) => format!("max-age={}", valid_for.as_secs()),
        None => "no-store".to_string(),
    };
    let mut response = (
        StatusCode::OK,
        [
            (CONTENT_TYPE, rendered.payload.content_type()),
            (CACHE_CONTROL, cache_control),
        ],
        Body::from(rendered.payload.body),
    )
        .into_response();
    response.extensions_mut().insert(ServedDocument {
        document: document.to_string(),
        cached: rendered.from_cache,
    });
    response
}
