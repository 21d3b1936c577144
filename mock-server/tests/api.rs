use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, unsigned_token, Preferences};
use serde_json::json;
use tower::ServiceExt;

const PREFERENCES: &str = "/api/users/preferences";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn bearer(username: &str) -> String {
    let claims = json!({"custom:idp_name": "idir", "custom:idp_username": username});
    format!("Bearer {}", unsigned_token(&claims))
}

fn get_request(auth: Option<&str>) -> Request<String> {
    let mut builder = Request::builder().uri(PREFERENCES);
    if let Some(auth) = auth {
        builder = builder.header(http::header::AUTHORIZATION, auth);
    }
    builder.body(String::new()).unwrap()
}

fn put_request(auth: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("PUT")
        .uri(PREFERENCES)
        .header(http::header::AUTHORIZATION, auth)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- get ---

#[tokio::test]
async fn get_preferences_empty_for_new_user() {
    let resp = app().oneshot(get_request(Some(&bearer("jdoe")))).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let prefs: Preferences = body_json(resp).await;
    assert!(prefs.is_empty());
}

#[tokio::test]
async fn get_preferences_without_token_returns_401() {
    let resp = app().oneshot(get_request(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- put ---

#[tokio::test]
async fn put_preferences_returns_202_with_empty_body() {
    let resp = app()
        .oneshot(put_request(&bearer("jdoe"), r#"{"theme":"g100"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn put_preferences_malformed_json_returns_400() {
    let resp = app()
        .oneshot(put_request(&bearer("jdoe"), "{not json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- lifecycle ---

#[tokio::test]
async fn preferences_are_isolated_per_user() {
    use tower::Service;

    let mut app = app().into_service();

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(put_request(&bearer("jdoe"), r#"{"theme":"g90","density":"compact"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    // same user reads back what was stored
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(Some(&bearer("jdoe"))))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let prefs: Preferences = body_json(resp).await;
    assert_eq!(prefs["theme"], "g90");
    assert_eq!(prefs["density"], "compact");

    // another user sees nothing
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(Some(&bearer("asmith"))))
        .await
        .unwrap();
    let prefs: Preferences = body_json(resp).await;
    assert!(prefs.is_empty());

    // a second put replaces the stored map
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(put_request(&bearer("jdoe"), r#"{"theme":"white"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get_request(Some(&bearer("jdoe"))))
        .await
        .unwrap();
    let prefs: Preferences = body_json(resp).await;
    assert_eq!(prefs.len(), 1);
    assert_eq!(prefs["theme"], "white");
}

// --- forms ---

fn form_request(content_type: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri("/api/forms/echo")
        .header(http::header::CONTENT_TYPE, content_type)
        .body(body.to_string())
        .unwrap()
}

#[tokio::test]
async fn echo_form_returns_fields_and_content_type() {
    let body = "--XBOUNDARY\r\n\
                Content-Disposition: form-data; name=\"name\"\r\n\r\n\
                report\r\n\
                --XBOUNDARY--\r\n";
    let resp = app()
        .oneshot(form_request("multipart/form-data; boundary=XBOUNDARY", body))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: serde_json::Value = body_json(resp).await;
    assert_eq!(echoed["fields"], json!({"name": "report"}));
    assert_eq!(
        echoed["contentTypes"],
        json!(["multipart/form-data; boundary=XBOUNDARY"])
    );
}

#[tokio::test]
async fn echo_form_without_boundary_is_rejected() {
    let resp = app()
        .oneshot(form_request("multipart/form-data", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
