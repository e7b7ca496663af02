// tests/e2e_smoke.rs
//
// Full app built the way the binary builds it: config/analyzer.toml on disk,
// generator chosen from AI_TEST_MODE.

use axum::body::{to_bytes, Body};
use http::{Request, StatusCode};
use tower::ServiceExt; // for `oneshot` (tower 0.5 with features=["util"])

#[tokio::test]
async fn smoke_comprehensive_with_repo_config_and_mock_model() {
    std::env::set_var("ANALYZER_CONFIG_PATH", "config/analyzer.toml");
    std::env::set_var("AI_TEST_MODE", "mock");

    let app = case_note_critic::app().await.expect("app() builds Router");

    let req = Request::builder()
        .method("POST")
        .uri("/api/analyze-case")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"caseNote":"Patient: John Doe\n45M chest pain, BP 150/95.","useComprehensive":true,"userId":"smoke"}"#,
        ))
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let s = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(s.contains("\"totalScore\":10"), "{s}");
    assert!(s.contains("\"usage\""));

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
