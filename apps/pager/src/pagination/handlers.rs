use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::block::BlockNode;
use crate::pagination::export::{partition_for_export, ExportDocument};
use crate::pagination::navigator::ScrollTarget;
use crate::pagination::session::{PreviewSession, PreviewSnapshot};
use crate::pagination::spacing::{MarginMap, SpacingDirection};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub document: BlockNode,
    /// Defaults to visible.
    pub indicators_visible: Option<bool>,
}

/// Upper bound on how long a snapshot long-poll is held open.
pub const SNAPSHOT_WAIT_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub snapshot: PreviewSnapshot,
    /// Ready-to-inject overlay for hosts that do not draw indicators themselves.
    pub indicator_markup: String,
}

#[derive(Deserialize)]
pub struct SnapshotWaitQuery {
    /// Last revision the host has rendered.
    pub after: u64,
}

/// A re-measured tree. Offsets and heights are taken as laid out by the host, so
/// any margin adjustments it had already rendered must be listed here; they are not
/// shifted a second time. Omit for a tree measured without adjustments.
#[derive(Deserialize)]
pub struct ReplaceDocumentRequest {
    pub document: BlockNode,
    #[serde(default)]
    pub rendered_margins: MarginMap,
}

#[derive(Deserialize)]
pub struct SpacingRequest {
    pub section_id: String,
    pub direction: SpacingDirection,
}

#[derive(Serialize)]
pub struct SpacingResponse {
    pub applied: bool,
    pub margin_px: Option<u32>,
}

#[derive(Deserialize)]
pub struct IndicatorToggle {
    pub visible: bool,
}

#[derive(Serialize)]
pub struct NavigationResponse {
    pub page_number: u32,
    pub target: Option<ScrollTarget>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub document: BlockNode,
    #[serde(default)]
    pub margins: MarginMap,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub document: ExportDocument,
    pub markup: String,
}

async fn find_session(state: &AppState, id: Uuid) -> Result<Arc<PreviewSession>, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Preview session {id} not found")))
}

fn session_response(session: &PreviewSession, snapshot: PreviewSnapshot) -> SessionResponse {
    SessionResponse {
        session_id: session.id,
        created_at: session.created_at,
        indicator_markup: snapshot.indicators.to_markup(),
        snapshot,
    }
}

/// POST /api/v1/preview/sessions
/// Pagination is computed before responding, so the first snapshot is ready on mount.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let session = PreviewSession::start(req.document, state.config.pagination.clone());
    if let Some(false) = req.indicators_visible {
        session.set_indicators_visible(false).await;
    }
    let session = state.sessions.insert(session).await;
    let active_sessions = state.sessions.len().await;
    tracing::info!(
        session_id = %session.id,
        active_sessions,
        "Preview session created"
    );
    let snapshot = session.snapshot();
    Ok((StatusCode::CREATED, Json(session_response(&session, snapshot))))
}

/// GET /api/v1/preview/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let snapshot = session.snapshot();
    Ok(Json(session_response(&session, snapshot)))
}

/// GET /api/v1/preview/sessions/:id/snapshot?after=N
/// Holds the request until a snapshot newer than `after` is published, or the wait
/// times out; either way the latest snapshot is returned.
pub async fn handle_wait_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SnapshotWaitQuery>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let mut rx = session.subscribe();
    let waited = tokio::time::timeout(
        SNAPSHOT_WAIT_TIMEOUT,
        rx.wait_for(|snapshot| snapshot.revision > params.after),
    )
    .await
    .map(|changed| changed.map(|_| ()));
    match waited {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Snapshot publisher for session {id} closed"))
                .into())
        }
        Err(_) => {
            tracing::debug!(session_id = %id, after = params.after, "Snapshot wait timed out");
        }
    }
    let snapshot = rx.borrow().clone();
    Ok(Json(session_response(&session, snapshot)))
}

/// DELETE /api/v1/preview/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .remove(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Preview session {id} not found")))?;
    tracing::info!(session_id = %id, "Preview session ended");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/preview/sessions/:id/document
pub async fn handle_replace_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplaceDocumentRequest>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, id).await?;
    session
        .replace_document(req.document, req.rendered_margins)
        .await;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/preview/sessions/:id/recompute
pub async fn handle_request_recompute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, id).await?;
    session.request_recompute();
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/preview/sessions/:id/spacing
pub async fn handle_adjust_spacing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SpacingRequest>,
) -> Result<Json<SpacingResponse>, AppError> {
    if req.section_id.trim().is_empty() {
        return Err(AppError::Validation("section_id must not be empty".to_string()));
    }
    let session = find_session(&state, id).await?;
    let margin_px = session.adjust_spacing(&req.section_id, req.direction).await;
    Ok(Json(SpacingResponse {
        applied: margin_px.is_some(),
        margin_px,
    }))
}

/// DELETE /api/v1/preview/sessions/:id/spacing
pub async fn handle_reset_spacing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, id).await?;
    session.reset_spacing().await;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/preview/sessions/:id/spacing/:section_id
pub async fn handle_reset_section_spacing(
    State(state): State<AppState>,
    Path((id, section_id)): Path<(Uuid, String)>,
) -> Result<Json<SpacingResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let applied = session.reset_section_spacing(&section_id).await;
    Ok(Json(SpacingResponse {
        applied,
        margin_px: applied.then_some(0),
    }))
}

/// PUT /api/v1/preview/sessions/:id/indicators
pub async fn handle_toggle_indicators(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<IndicatorToggle>,
) -> Result<StatusCode, AppError> {
    let session = find_session(&state, id).await?;
    session.set_indicators_visible(req.visible).await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/preview/sessions/:id/pages/:n
pub async fn handle_go_to_page(
    State(state): State<AppState>,
    Path((id, page_number)): Path<(Uuid, u32)>,
) -> Result<Json<NavigationResponse>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(Json(NavigationResponse {
        page_number,
        target: session.go_to_page(page_number),
    }))
}

/// POST /api/v1/export/partition
pub async fn handle_export_partition(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    let settings = &state.config.pagination;
    let document = partition_for_export(
        &req.document,
        &settings.break_config,
        &settings.budget,
        &req.margins,
    );
    let markup = document.to_markup();
    Ok(Json(ExportResponse { document, markup }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::block::fixtures::document;
    use crate::pagination::PaginationSettings;
    use crate::routes::build_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn make_state() -> AppState {
        AppState::new(Config {
            port: 0,
            rust_log: "debug".to_string(),
            pagination: PaginationSettings::default(),
            session_ttl: Duration::from_secs(1800),
            allowed_origins: Vec::new(),
        })
    }

    fn make_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Three 1000px (500pt) sections: three pages, two breaks.
    fn three_page_document() -> Value {
        serde_json::to_value(document(&[
            ("experience", 1000.0),
            ("education", 1000.0),
            ("skills", 1000.0),
        ]))
        .unwrap()
    }

    async fn create_session(app: &Router) -> (String, Value) {
        let (status, body) = send(
            app,
            make_request(
                "POST",
                "/api/v1/preview/sessions",
                Some(json!({ "document": three_page_document() })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["session_id"].as_str().unwrap().to_string();
        (id, body)
    }

    #[tokio::test]
    async fn test_health_reports_service() {
        let app = build_router(make_state());
        let (status, body) = send(&app, make_request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "pager");
    }

    #[tokio::test]
    async fn test_create_session_returns_initial_snapshot() {
        let app = build_router(make_state());
        let (_, body) = create_session(&app).await;

        let snapshot = &body["snapshot"];
        assert_eq!(snapshot["revision"], 1);
        assert_eq!(snapshot["pagination"]["total_pages"], 3);
        assert_eq!(snapshot["pagination"]["total_breaks"], 2);
        assert_eq!(snapshot["sections"][0]["role"], "experience-entry");
        assert_eq!(snapshot["indicators"]["indicators"][0]["label"], "Page 2");
        let overlay = body["indicator_markup"].as_str().unwrap();
        assert_eq!(overlay.matches("data-print-exclude").count(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_wait_returns_after_recompute() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;

        let (status, _) = send(
            &app,
            make_request(
                "PUT",
                &format!("/api/v1/preview/sessions/{id}/document"),
                Some(json!({ "document": document(&[("experience", 200.0)]) })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = send(
            &app,
            make_request(
                "GET",
                &format!("/api/v1/preview/sessions/{id}/snapshot?after=1"),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["snapshot"]["revision"], 2);
        assert_eq!(body["snapshot"]["pagination"]["total_pages"], 1);
    }

    #[tokio::test]
    async fn test_replaced_document_with_rendered_margins_keeps_breaks() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;
        let wait = |after: u64| {
            make_request(
                "GET",
                &format!("/api/v1/preview/sessions/{id}/snapshot?after={after}"),
                None,
            )
        };

        send(
            &app,
            make_request(
                "POST",
                &format!("/api/v1/preview/sessions/{id}/spacing"),
                Some(json!({ "section_id": "section-0", "direction": "increase" })),
            ),
        )
        .await;
        let (_, body) = send(&app, wait(1)).await;
        assert_eq!(body["snapshot"]["pagination"]["break_points"][0]["y_offset_px"], 1010.0);

        let mut rendered_tree = document(&[
            ("experience", 1000.0),
            ("education", 1000.0),
            ("skills", 1000.0),
        ]);
        for later in rendered_tree.children.iter_mut().skip(1) {
            later.offset_top_px += 10.0;
        }
        let (status, _) = send(
            &app,
            make_request(
                "PUT",
                &format!("/api/v1/preview/sessions/{id}/document"),
                Some(json!({
                    "document": rendered_tree,
                    "rendered_margins": { "section-0": 10 }
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = send(&app, wait(2)).await;
        let breaks = &body["snapshot"]["pagination"]["break_points"];
        assert_eq!(breaks[0]["y_offset_px"], 1010.0);
        assert_eq!(breaks[1]["y_offset_px"], 2010.0);
    }

    #[tokio::test]
    async fn test_reset_section_spacing_reports_whether_anything_changed() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;

        send(
            &app,
            make_request(
                "POST",
                &format!("/api/v1/preview/sessions/{id}/spacing"),
                Some(json!({ "section_id": "section-0", "direction": "increase" })),
            ),
        )
        .await;

        let uri = format!("/api/v1/preview/sessions/{id}/spacing/section-0");
        let (_, first) = send(&app, make_request("DELETE", &uri, None)).await;
        assert_eq!(first["applied"], true);
        assert_eq!(first["margin_px"], 0);

        let (_, second) = send(&app, make_request("DELETE", &uri, None)).await;
        assert_eq!(second["applied"], false);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let app = build_router(make_state());
        let uri = format!("/api/v1/preview/sessions/{}", Uuid::new_v4());
        let (status, body) = send(&app, make_request("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_navigation_resolves_pages_and_ignores_stale_ones() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;

        let (_, first) = send(
            &app,
            make_request("GET", &format!("/api/v1/preview/sessions/{id}/pages/1"), None),
        )
        .await;
        assert_eq!(first["target"]["kind"], "document_top");

        let (_, second) = send(
            &app,
            make_request("GET", &format!("/api/v1/preview/sessions/{id}/pages/2"), None),
        )
        .await;
        assert_eq!(second["target"]["kind"], "indicator");
        assert_eq!(second["target"]["page_number"], 2);

        let (status, stale) = send(
            &app,
            make_request("GET", &format!("/api/v1/preview/sessions/{id}/pages/9"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(stale["target"].is_null());
    }

    #[tokio::test]
    async fn test_spacing_on_stale_section_is_not_applied() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;
        let uri = format!("/api/v1/preview/sessions/{id}/spacing");

        let (status, applied) = send(
            &app,
            make_request(
                "POST",
                &uri,
                Some(json!({ "section_id": "section-1", "direction": "increase" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["applied"], true);
        assert_eq!(applied["margin_px"], 10);

        let (status, stale) = send(
            &app,
            make_request(
                "POST",
                &uri,
                Some(json!({ "section_id": "section-42", "direction": "increase" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stale["applied"], false);
        assert!(stale["margin_px"].is_null());

        let (status, _) = send(
            &app,
            make_request(
                "POST",
                &uri,
                Some(json!({ "section_id": " ", "direction": "decrease" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_indicator_toggle_is_reflected_in_snapshot() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;

        let (status, _) = send(
            &app,
            make_request(
                "PUT",
                &format!("/api/v1/preview/sessions/{id}/indicators"),
                Some(json!({ "visible": false })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(
            &app,
            make_request("GET", &format!("/api/v1/preview/sessions/{id}"), None),
        )
        .await;
        assert_eq!(body["snapshot"]["indicators"]["visible"], false);
    }

    #[tokio::test]
    async fn test_delete_session_ends_it() {
        let app = build_router(make_state());
        let (id, _) = create_session(&app).await;
        let uri = format!("/api/v1/preview/sessions/{id}");

        let (status, _) = send(&app, make_request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, make_request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_partition_returns_pages_and_markup() {
        let app = build_router(make_state());
        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/v1/export/partition",
                Some(json!({ "document": three_page_document() })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["document"]["pages"].as_array().unwrap().len(), 3);
        let markup = body["markup"].as_str().unwrap();
        assert_eq!(markup.matches("resume-page").count(), 3);
    }

    #[tokio::test]
    async fn test_export_of_empty_document_yields_one_page() {
        let app = build_router(make_state());
        let (status, body) = send(
            &app,
            make_request(
                "POST",
                "/api/v1/export/partition",
                Some(json!({ "document": { "tag": "div" } })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let pages = body["document"]["pages"].as_array().unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0]["sections"].as_array().unwrap().is_empty());
    }
}
