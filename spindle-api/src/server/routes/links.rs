use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use spindle_core::{
    ThreadService,
    links::{LinkReport, RepairSummary},
};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(audit_links)
        .typed_post(repair_links)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/links/audit", rejection(ServerError))]
struct AuditLinksPath();

async fn audit_links(
    AuditLinksPath(): AuditLinksPath,
    State(threads): State<ThreadService>,
) -> Result<Json<LinkReport>> {
    Ok(Json(threads.audit_links().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/links/repair", rejection(ServerError))]
struct RepairLinksPath();

async fn repair_links(
    RepairLinksPath(): RepairLinksPath,
    State(threads): State<ThreadService>,
) -> Result<Json<RepairSummary>> {
    Ok(Json(threads.repair_links().await?))
}

#[cfg(test)]
mod tests {
    use crate::server::routes::testing::app;
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use spindle_core::memory::StoreOp;

    #[tokio::test]
    async fn audit_and_repair_orphans() {
        let app = app();
        let (_, created) = app
            .post(
                "/posts/create",
                json!({ "text": "hello", "author": 1, "path": "/" }),
            )
            .await;
        let root = created["id"].as_u64().unwrap();

        app.store.fail(StoreOp::AppendChild);
        let (status, _) = app
            .post(
                &format!("/posts/{root}/replies"),
                json!({ "text": "lost", "author": 2, "path": "/" }),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        app.store.recover(StoreOp::AppendChild);

        let (status, report) = app.get("/links/audit").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["orphan_replies"].as_array().map(Vec::len), Some(1));
        assert_eq!(report["orphan_replies"][0]["parent"].as_u64(), Some(root));

        let (status, summary) = app.post("/links/repair", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["relinked_replies"], json!(1));

        let (_, report) = app.get("/links/audit").await;
        assert_eq!(report["orphan_replies"], json!([]));
    }
}
