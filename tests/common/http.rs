use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::util::ServiceExt;

pub async fn request(app: &Router, method: Method, path: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(path);

    let req = if let Some(payload) = body {
        builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("empty body")
    };

    app.clone().oneshot(req).await.expect("oneshot response")
}

pub async fn response_json(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body bytes");

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice::<Value>(&bytes).expect("parse json body")
    };

    (status, json)
}

/// Post a text message to the webhook and return the reply actions.
pub async fn send_message(app: &Router, user_id: &str, text: &str) -> Vec<Value> {
    let body = json!({
        "userId": user_id,
        "ts": "2026-03-10T10:00:00Z",
        "kind": "message",
        "text": text,
    });
    let resp = request(app, Method::POST, "/webhook", Some(body)).await;
    let (status, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::OK, "webhook failed: {body}");
    assert_eq!(body["success"], true);
    body["data"].as_array().expect("actions array").clone()
}

/// Post a keyboard choice to the webhook and return the reply actions.
pub async fn send_choice(app: &Router, user_id: &str, payload: &str) -> Vec<Value> {
    let body = json!({
        "userId": user_id,
        "ts": "2026-03-10T10:00:00Z",
        "kind": "choice",
        "payload": payload,
    });
    let resp = request(app, Method::POST, "/webhook", Some(body)).await;
    let (status, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::OK, "webhook failed: {body}");
    assert_eq!(body["success"], true);
    body["data"].as_array().expect("actions array").clone()
}

/// All SendText texts concatenated, for content assertions.
pub fn texts_of(actions: &[Value]) -> String {
    actions
        .iter()
        .filter(|a| a["action"] == "send_text")
        .map(|a| a["text"].as_str().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn has_options(actions: &[Value]) -> bool {
    actions.iter().any(|a| a["action"] == "show_options")
}
