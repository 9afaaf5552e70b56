use crate::server::ServerRouter;
use axum::Router;

mod links;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(users::routes())
        .merge(links::routes())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::server::{ServerState, routes};
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::Value;
    use spindle_common::model::user::{User, UserHandle};
    use spindle_core::{MemoryStore, RecordingInvalidator, ThreadService, ThreadServiceConfig};
    use std::sync::Arc;
    use tower::ServiceExt;

    pub struct TestApp {
        pub store: Arc<MemoryStore>,
        pub invalidator: Arc<RecordingInvalidator>,
        router: Router,
    }

    pub fn app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let invalidator = Arc::new(RecordingInvalidator::default());
        for (id, handle, name) in [(1, "ada", "Ada"), (2, "brook", "Brook")] {
            store.insert_user(User {
                id: id.into(),
                handle: UserHandle::new(handle.to_owned()).unwrap(),
                name: name.to_owned(),
                image: None,
                threads: Vec::new(),
            });
        }

        let threads = ThreadService::new(
            store.clone(),
            invalidator.clone(),
            ThreadServiceConfig::default(),
        );
        let router = routes().with_state(ServerState { threads });

        TestApp {
            store,
            invalidator,
            router,
        }
    }

    impl TestApp {
        pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap())
                .await
        }

        pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }
    }
}
