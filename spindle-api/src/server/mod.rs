use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use json::Json;
use serde::{Deserialize, Serialize};
use spindle_core::{StoreError, ThreadError, ThreadService};
use thiserror::Error;
use tracing::error;

mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub threads: ThreadService,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error(transparent)]
    Thread(#[from] ThreadError),
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::Thread(ThreadError::NotFound(_) | ThreadError::UserNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::Thread(ThreadError::InvalidText(_)) => StatusCode::BAD_REQUEST,
            ServerError::Thread(ThreadError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Thread(ThreadError::Connection(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Thread(
                ThreadError::Query(err)
                | ThreadError::Create(err)
                | ThreadError::Reply(err)
                | ThreadError::Fetch(err)
                | ThreadError::Repair(err),
            ) => store_status(err),
            ServerError::JsonResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        // server side failures stay opaque to clients
        let message = if status.is_server_error() {
            status.canonical_reason().unwrap_or_default().to_owned()
        } else {
            self.to_string()
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::ServerError;
    use axum::http::StatusCode;
    use spindle_core::{StoreError, ThreadError};
    use std::time::Duration;

    fn status(err: ThreadError) -> StatusCode {
        ServerError::from(err).status()
    }

    #[test]
    fn thread_errors_map_to_statuses() {
        assert_eq!(status(ThreadError::NotFound(1.into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ThreadError::UserNotFound(1.into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ThreadError::Timeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(ThreadError::Connection(StoreError::backend("refused"))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ThreadError::Query(StoreError::unreachable("gone"))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ThreadError::Create(StoreError::Missing { kind: "User", id: 3 })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
