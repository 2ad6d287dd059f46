use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use paperstore::library::{ListQuery, PaperPage, PaperUpdate};

use crate::error::ApiError;
use crate::state::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/papers", post(create_paper).get(list_papers))
        .route(
            "/papers/{id}",
            get(get_paper).patch(update_paper).delete(delete_paper),
        )
        .route("/papers/{id}/note", patch(update_note))
        .route("/papers/{id}/pdf", get(paper_pdf))
        .route("/tags", get(list_tags))
}

#[derive(Deserialize)]
struct CreatePaper {
    url: String,
}

#[derive(Deserialize)]
struct NoteBody {
    content: String,
}

async fn create_paper(
    State(state): State<AppState>,
    Json(body): Json<CreatePaper>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let paper = state.ingest.ingest(&body.url).await?;
    let detail = state.library.get(&paper.id)?;
    Ok((StatusCode::CREATED, Json(json!({ "paper": detail }))))
}

async fn list_papers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaperPage>, ApiError> {
    Ok(Json(state.library.list(&query)?))
}

async fn get_paper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.library.get(&id)?;
    Ok(Json(json!({ "paper": detail })))
}

async fn update_paper(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<PaperUpdate>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.library.update(&id, update)?;
    Ok(Json(json!({ "paper": detail })))
}

async fn delete_paper(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.library.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<Json<Value>, ApiError> {
    let note = state.library.update_note(&id, &body.content)?;
    Ok(Json(json!({ "note": note })))
}

async fn paper_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let url = state.library.pdf_url(&id)?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tags = state.library.list_tags()?;
    Ok(Json(json!({ "tags": tags })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use paperstore::db::paper_repo::{self, PaperRow};
    use paperstore::db::tag_repo;

    use super::super::tests::{get, json_request, send, test_app, TestApp};

    fn add_paper(app: &TestApp, id: &str) {
        paper_repo::insert_with_note(
            &app.state.db,
            &PaperRow {
                id: id.to_string(),
                arxiv_id: None,
                title: Some(format!("Paper {}", id)),
                authors: vec![],
                published_date: None,
                abstract_text: None,
                submission_url: format!("https://example.org/{}.pdf", id),
                file_id: format!("{}.pdf", id),
                view_url: format!("/files/{}.pdf", id),
                metadata_skip_reason: None,
                added_at: "2026-01-01T00:00:00.000Z".to_string(),
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_and_list_papers() {
        let app = test_app();
        add_paper(&app, "p1");

        let (status, body) = send(&app, get("/papers/p1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paper"]["title"], "Paper p1");
        assert_eq!(body["paper"]["note"]["content"], "");

        let (status, body) = send(&app, get("/papers?sort=title&page=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["papers"][0]["id"], "p1");

        let (status, body) = send(&app, get("/papers/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_update_paper_and_note() {
        let app = test_app();
        add_paper(&app, "p1");

        let (status, body) = send(
            &app,
            json_request(
                "PATCH",
                "/papers/p1",
                json!({ "title": "Renamed", "published_date": "2021-03", "tags": ["ml"] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paper"]["title"], "Renamed");
        assert_eq!(body["paper"]["published_date"], "2021-03-01");
        assert_eq!(body["paper"]["tags"], json!(["ml"]));

        let (status, body) = send(
            &app,
            json_request("PATCH", "/papers/p1", json!({ "published_date": "soon" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_input");

        let (status, body) = send(
            &app,
            json_request("PATCH", "/papers/p1/note", json!({ "content": "Good read" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["note"]["content"], "Good read");

        let (_, body) = send(&app, get("/tags")).await;
        assert_eq!(body["tags"], json!(["ml"]));
    }

    #[tokio::test]
    async fn test_pdf_redirect_and_delete() {
        let app = test_app();
        add_paper(&app, "p1");
        tag_repo::set_for_paper(&app.state.db, "p1", &["solo".to_string()]).unwrap();

        let response = {
            use tower::ServiceExt;
            app.router
                .clone()
                .oneshot(get("/papers/p1/pdf"))
                .await
                .unwrap()
        };
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "/files/p1.pdf");

        let request = axum::http::Request::delete("/papers/p1")
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, get("/papers/p1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, body) = send(&app, get("/tags")).await;
        assert_eq!(body["tags"], json!([]));
    }

    #[tokio::test]
    async fn test_create_paper_rejects_bad_and_duplicate_urls() {
        let app = test_app();
        add_paper(&app, "p1");

        let (status, body) = send(
            &app,
            json_request("POST", "/papers", json!({ "url": "not a url" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_input");

        let (status, body) = send(
            &app,
            json_request("POST", "/papers", json!({ "url": "https://example.org/p1.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "duplicate");
    }
}
