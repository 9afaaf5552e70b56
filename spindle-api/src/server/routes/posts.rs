use crate::server::{
    Result, ServerError, ServerRouter,
    json::{Json, Query},
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use spindle_common::model::{
    Id,
    post::PostMarker,
    view::{PostPage, ThreadNode},
};
use spindle_core::{CreateComment, CreateThread, PageRequest, ThreadService};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_post(create_reply)
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct CreatedPost {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct ListPostsPath();

async fn list_posts(
    ListPostsPath(): ListPostsPath,
    State(threads): State<ThreadService>,
    Query(page): Query<PageRequest>,
) -> Result<Json<PostPage>> {
    Ok(Json(threads.fetch_posts(page).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/create", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(threads): State<ThreadService>,
    Json(thread): Json<CreateThread>,
) -> Result<(StatusCode, Json<CreatedPost>)> {
    let id = threads.create_thread(thread).await?;

    Ok((StatusCode::CREATED, Json(CreatedPost { id })))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct GetPostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    GetPostPath { id }: GetPostPath,
    State(threads): State<ThreadService>,
) -> Result<Json<ThreadNode>> {
    Ok(Json(threads.fetch_thread_by_id(id).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/replies", rejection(ServerError))]
struct CreateReplyPath {
    id: Id<PostMarker>,
}

async fn create_reply(
    CreateReplyPath { id }: CreateReplyPath,
    State(threads): State<ThreadService>,
    Json(comment): Json<CreateComment>,
) -> Result<(StatusCode, Json<CreatedPost>)> {
    let id = threads.add_comment_to_thread(id, comment).await?;

    Ok((StatusCode::CREATED, Json(CreatedPost { id })))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::testing::app;
    use axum::http::StatusCode;
    use serde_json::json;
    use spindle_core::memory::StoreOp;

    #[tokio::test]
    async fn create_then_list() {
        let app = app();

        let (status, created) = app
            .post(
                "/posts/create",
                json!({ "text": "hello", "author": 1, "path": "/" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_u64().unwrap();

        let (status, page) = app.get("/posts?page=1&page_size=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["is_next"], json!(false));
        assert_eq!(page["posts"][0]["id"].as_u64(), Some(id));
        assert_eq!(page["posts"][0]["text"], json!("hello"));
        assert_eq!(page["posts"][0]["author"]["name"], json!("Ada"));
        assert_eq!(app.invalidator.paths(), vec!["/".to_owned()]);
    }

    #[tokio::test]
    async fn reply_is_part_of_the_tree() {
        let app = app();
        let (_, created) = app
            .post(
                "/posts/create",
                json!({ "text": "hello", "author": 1, "path": "/" }),
            )
            .await;
        let root = created["id"].as_u64().unwrap();

        let (status, reply) = app
            .post(
                &format!("/posts/{root}/replies"),
                json!({ "text": "hi back", "author": 2, "path": "/thread" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, tree) = app.get(&format!("/posts/{root}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree["children"][0]["id"], reply["id"]);
        assert_eq!(tree["children"][0]["author"]["name"], json!("Brook"));
        assert_eq!(tree["children"][0]["parent_id"].as_u64(), Some(root));
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let app = app();

        let (status, body) = app.get("/posts/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], json!(404));

        let (status, _) = app
            .post(
                "/posts/42/replies",
                json!({ "text": "hi", "author": 2, "path": "/" }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(app.store.posts().is_empty());
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let app = app();

        let (status, _) = app
            .post(
                "/posts/create",
                json!({ "text": "  ", "author": 1, "path": "/" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post("/posts/create", json!({ "text": "no author" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.get("/posts?page=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.get("/posts/not-a-number").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn store_outage_is_unavailable() {
        let app = app();
        app.store.set_unreachable(true);

        let (status, body) = app.get("/posts").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], json!("Service Unavailable"));

        app.store.set_unreachable(false);
        app.store.fail(StoreOp::InsertPost);
        let (status, _) = app
            .post(
                "/posts/create",
                json!({ "text": "hello", "author": 1, "path": "/" }),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
