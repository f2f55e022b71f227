use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::modules::error::AuthError;
use crate::modules::protocol::{Dispatcher, Outcome, Request, Response};

/// Shared state injected into the request handler
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Signalled once a request hit a persistence failure
    pub fatal: Arc<Notify>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            fatal: Arc::new(Notify::new()),
        }
    }
}

/// Every path is served by the same message endpoint
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(handle_message).with_state(state)
}

fn json_reply(status: StatusCode, response: Response) -> HttpResponse {
    (status, Json(response)).into_response()
}

async fn handle_message(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> HttpResponse {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed").into_response();
    }

    let request: Request = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::debug!("Could not parse request body: {}", e);
            let error = AuthError::MalformedMessage(e.to_string());
            return json_reply(StatusCode::BAD_REQUEST, Response::failure("", &error));
        }
    };
    let id = request.id.clone();

    // Dispatch hashes passwords and writes files; keep it off the async workers
    let dispatcher = Arc::clone(&state.dispatcher);
    let outcome = match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Request handler failed: {}", e);
            let error = AuthError::Persistence("request handler failed".to_string());
            state.fatal.notify_one();
            return json_reply(StatusCode::INTERNAL_SERVER_ERROR, Response::failure(id, &error));
        }
    };

    match outcome {
        Outcome::Responded { response, fatal } => {
            if fatal {
                state.fatal.notify_one();
            }
            json_reply(StatusCode::OK, response)
        }
        Outcome::Rejected(response) => json_reply(StatusCode::FORBIDDEN, response),
    }
}
