use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use spindle_common::model::{
    Id,
    user::{User, UserMarker},
};
use spindle_core::ThreadService;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_user)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct GetUserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    GetUserPath { id }: GetUserPath,
    State(threads): State<ThreadService>,
) -> Result<Json<User>> {
    Ok(Json(threads.fetch_user(id).await?))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::testing::app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn user_lists_created_threads() {
        let app = app();
        let (_, created) = app
            .post(
                "/posts/create",
                json!({ "text": "hello", "author": 2, "path": "/" }),
            )
            .await;

        let (status, user) = app.get("/users/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["handle"], json!("brook"));
        assert_eq!(user["threads"], json!([created["id"]]));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (status, _) = app().get("/users/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
