use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::{error, info};

use parlor_db::timeline::HISTORY_LIMIT;
use parlor_types::api::{HistoryQuery, PostMessageRequest, PostPhotoRequest, PostResponse};
use parlor_types::models::NewTimelineEntry;

use crate::auth::{AppState, AppStateInner, authenticate};
use crate::error::ApiError;

/// `POST /api/message` posts a text message with inline credentials.
pub async fn post_message(
    State(state): State<AppState>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.password.is_empty() || req.message.is_empty() {
        return Err(ApiError::BadRequest(
            "username, password and message are required".into(),
        ));
    }

    authenticate(&state, &req.username, &req.password).await?;

    let entry = NewTimelineEntry::Message {
        username: req.username,
        message: req.message,
    };
    publish(&state, entry).await
}

/// `POST /api/photo` posts an encoded photo with an optional caption.
pub async fn post_photo(
    State(state): State<AppState>,
    Json(req): Json<PostPhotoRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.password.is_empty() || req.photo.is_empty() {
        return Err(ApiError::BadRequest(
            "username, password and photo are required".into(),
        ));
    }

    authenticate(&state, &req.username, &req.password).await?;

    let entry = NewTimelineEntry::Photo {
        username: req.username,
        photo: req.photo,
        caption: req.caption,
    };
    publish(&state, entry).await
}

/// Append to the timeline and broadcast to WebSocket clients.
async fn publish(state: &AppStateInner, entry: NewTimelineEntry) -> Result<Json<PostResponse>, ApiError> {
    if state.dispatcher.is_closed() {
        return Err(ApiError::Unavailable);
    }

    let stored = state.timeline.append(entry).map_err(|e| {
        error!("Error saving API post: {}", e);
        ApiError::Internal("Failed to save entry")
    })?;

    info!("{} posted entry {} via API", stored.username(), stored.id());
    state.dispatcher.broadcast(stored.clone().into()).await;

    Ok(Json(PostResponse {
        success: true,
        entry: stored,
    }))
}

/// `GET /api/history?limit=N` returns the most recent entries, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT);

    let history = state.timeline.recent_history(limit).map_err(|e| {
        error!("Error loading chat history: {}", e);
        ApiError::Internal("Failed to load history")
    })?;

    Ok(Json(history))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use parlor_db::{CredentialStore, Database, TimelineStore};
    use parlor_gateway::Dispatcher;
    use parlor_types::events::GatewayEvent;

    use crate::auth::AppStateInner;

    const LIMIT: usize = 10 * 1024 * 1024;

    async fn app(max_body_bytes: usize) -> (Router, Dispatcher) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let params = argon2::Params::new(8, 1, 1, None).unwrap();
        let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        let credentials = CredentialStore::with_argon2(db.clone(), argon2);
        credentials.register("alice", "secret1").await.unwrap();

        let dispatcher = Dispatcher::new(credentials, TimelineStore::new(db));
        let state = Arc::new(AppStateInner::new(dispatcher.clone()));
        (crate::router(state, max_body_bytes), dispatcher)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn post_message_appends_and_broadcasts() {
        let (app, dispatcher) = app(LIMIT).await;
        let (_conn, mut rx) = dispatcher.connect().await;

        let (status, body) = send(
            &app,
            post("/api/message", json!({"username": "alice", "password": "secret1", "message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["entry"]["type"], "message");
        assert_eq!(body["entry"]["message"], "hello");

        match rx.try_recv() {
            Ok(GatewayEvent::ChatMessage(m)) => assert_eq!(m.message, "hello"),
            other => panic!("expected broadcast, got {:?}", other),
        }

        let (status, history) = send(&app, get("/api/history")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (app, dispatcher) = app(LIMIT).await;
        let (_conn, mut rx) = dispatcher.connect().await;

        for body in [
            json!({"username": "alice", "password": "nope123", "message": "hi"}),
            json!({"username": "ghost", "password": "secret1", "message": "hi"}),
        ] {
            let (status, body) = send(&app, post("/api/message", body)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, json!({"success": false, "error": "Invalid username or password"}));
        }

        assert!(rx.try_recv().is_err());
        let (_, history) = send(&app, get("/api/history")).await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let (app, _) = app(LIMIT).await;

        let (status, body) = send(&app, post("/api/message", json!({"username": "alice"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            post("/api/photo", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn large_photo_is_accepted_under_limit() {
        let (app, _) = app(LIMIT).await;
        let photo = format!("data:image/png;base64,{}", "A".repeat(2 * 1024 * 1024));

        let (status, body) = send(
            &app,
            post(
                "/api/photo",
                json!({"username": "alice", "password": "secret1", "photo": photo, "caption": "big"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entry"]["type"], "photo");
        assert_eq!(body["entry"]["caption"], "big");
    }

    #[tokio::test]
    async fn photo_at_the_limit_is_accepted() {
        let (app, _) = app(1024).await;
        let photo = "A".repeat(1024);

        let (status, body) = send(
            &app,
            post(
                "/api/photo",
                json!({"username": "alice", "password": "secret1", "photo": photo, "caption": "exact"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entry"]["photo"].as_str().unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let (app, _) = app(1024).await;
        let photo = "A".repeat(1024 + crate::ENVELOPE_HEADROOM);

        let (status, _) = send(
            &app,
            post("/api/photo", json!({"username": "alice", "password": "secret1", "photo": photo})),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn history_limit_is_capped() {
        let (app, dispatcher) = app(LIMIT).await;
        for n in 0..120 {
            dispatcher
                .timeline()
                .append(parlor_types::models::NewTimelineEntry::Message {
                    username: "alice".into(),
                    message: format!("m{}", n),
                })
                .unwrap();
        }

        let (_, history) = send(&app, get("/api/history?limit=5")).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[4]["message"], "m119");

        let (_, history) = send(&app, get("/api/history?limit=500")).await;
        assert_eq!(history.as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn posts_are_refused_once_gateway_closes() {
        let (app, dispatcher) = app(LIMIT).await;
        dispatcher.close();

        let (status, body) = send(
            &app,
            post("/api/message", json!({"username": "alice", "password": "secret1", "message": "late"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, json!({"success": false, "error": "Server is shutting down"}));
        assert!(dispatcher.timeline().recent_history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let (app, _) = app(LIMIT).await;
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
