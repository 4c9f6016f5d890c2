// Integration tests for the backend HTTP client and the SDP negotiator,
// against a mock backend served by axum on an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lingua_live::{
    BackendClient, EphemeralCredential, Expression, Role, SdpNegotiator, SessionError, Transcript,
};
use serde_json::{json, Value};

async fn serve(router: Router) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Ok(addr)
}

fn expression(id: &str, text: &str) -> Expression {
    Expression {
        id: id.to_string(),
        expression: text.to_string(),
        meaning: None,
        example: None,
        review_count: None,
        mastered: None,
    }
}

#[tokio::test]
async fn conversation_credential_round_trip() -> Result<()> {
    let router = Router::new().route(
        "/session",
        get(|| async { Json(json!({"client_secret": {"value": "ek_123"}})) }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    let credential = client.conversation_credential().await?;
    assert_eq!(credential.secret(), "ek_123");
    Ok(())
}

#[tokio::test]
async fn missing_credential_field_is_a_credential_error() -> Result<()> {
    let router = Router::new().route(
        "/session",
        get(|| async { Json(json!({"unexpected": true})) }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    let err = client.conversation_credential().await.unwrap_err();
    assert!(matches!(err, SessionError::Credential(_)));
    Ok(())
}

#[tokio::test]
async fn failing_session_endpoint_is_a_credential_error() -> Result<()> {
    let router = Router::new().route(
        "/session",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    let err = client.conversation_credential().await.unwrap_err();
    assert!(matches!(err, SessionError::Credential(_)));
    Ok(())
}

#[tokio::test]
async fn review_credential_posts_the_target_expressions() -> Result<()> {
    let router = Router::new().route(
        "/session/review",
        post(|Json(targets): Json<Vec<Value>>| async move {
            if targets.len() == 1 && targets[0]["expression"] == "go to the store" {
                Json(json!({"client_secret": {"value": "ek_review"}})).into_response()
            } else {
                StatusCode::BAD_REQUEST.into_response()
            }
        }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    let credential = client
        .review_credential(&[expression("e1", "go to the store")])
        .await?;
    assert_eq!(credential.secret(), "ek_review");
    Ok(())
}

#[tokio::test]
async fn finalize_ships_the_transcript_and_returns_extractions() -> Result<()> {
    let router = Router::new().route(
        "/api/conversation/finalize",
        post(|Json(body): Json<Value>| async move {
            if body["user_id"] != "demoUser"
                || body["messages"][0]["role"] != "user"
                || body["messages"][0]["text"] != "I went to the store"
                || body["messages"][1]["role"] != "assistant"
            {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Json(json!({
                "extracted_count": 1,
                "doc_id": "doc_42",
                "extracted_expressions": [
                    {
                        "id": "x1",
                        "expression": "go to the store",
                        "meaning": "visit a shop",
                        "example": "I go to the store every Sunday."
                    }
                ]
            }))
            .into_response()
        }),
    );
    let addr = serve(router).await?;

    let mut transcript = Transcript::new();
    transcript.push(Role::User, "I went to the store");
    transcript.push(Role::Assistant, "Nice, what did you buy?");

    let client = BackendClient::new(format!("http://{}", addr));
    let outcome = client
        .finalize_conversation("demoUser", &transcript)
        .await?;

    assert_eq!(outcome.extracted_count, 1);
    assert_eq!(outcome.doc_id, "doc_42");
    assert_eq!(outcome.extracted_expressions.len(), 1);
    assert_eq!(outcome.extracted_expressions[0].expression, "go to the store");
    Ok(())
}

#[tokio::test]
async fn failing_finalize_is_a_finalization_error() -> Result<()> {
    let router = Router::new().route(
        "/api/conversation/finalize",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream") }),
    );
    let addr = serve(router).await?;

    let mut transcript = Transcript::new();
    transcript.push(Role::User, "hello");

    let client = BackendClient::new(format!("http://{}", addr));
    let err = client
        .finalize_conversation("demoUser", &transcript)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Finalization(_)));
    Ok(())
}

#[tokio::test]
async fn evaluate_review_maps_expression_results() -> Result<()> {
    let router = Router::new().route(
        "/api/review/evaluate",
        post(|Json(body): Json<Value>| async move {
            if body["targetExpressions"][0]["id"] != "e1" {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Json(json!({"e1": {"success": true}})).into_response()
        }),
    );
    let addr = serve(router).await?;

    let mut transcript = Transcript::new();
    transcript.push(Role::User, "I went to the store");

    let client = BackendClient::new(format!("http://{}", addr));
    let evaluation = client
        .evaluate_review(&transcript, &[expression("e1", "go to the store")])
        .await?;

    let result = evaluation.get("e1").expect("e1 evaluated");
    assert!(result.success);
    assert!(result.usage_context.is_none());
    Ok(())
}

#[tokio::test]
async fn expressions_for_review_lists_due_expressions() -> Result<()> {
    let router = Router::new().route(
        "/api/expressions/review",
        get(|| async {
            Json(json!([
                {"id": "e1", "expression": "go to the store", "meaning": "visit a shop"},
                {"id": "e2", "expression": "on the other hand"}
            ]))
        }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    let due = client.expressions_for_review().await?;

    assert_eq!(due.len(), 2);
    assert_eq!(due[0].id, "e1");
    assert_eq!(due[0].meaning.as_deref(), Some("visit a shop"));
    assert_eq!(due[1].meaning, None);
    Ok(())
}

#[tokio::test]
async fn record_expression_review_hits_the_expression_route() -> Result<()> {
    let router = Router::new().route(
        "/api/expressions/:id/review",
        post(|Path(id): Path<String>| async move {
            if id == "e1" {
                Json(json!({"status": "ok"})).into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    client.record_expression_review("e1").await?;
    assert!(client.record_expression_review("missing").await.is_err());
    Ok(())
}

#[tokio::test]
async fn mark_expression_mastered_hits_the_mastery_route() -> Result<()> {
    let router = Router::new().route(
        "/api/expressions/:id/master",
        post(|Path(id): Path<String>| async move {
            if id == "e1" {
                Json(json!({"status": "ok"})).into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    client.mark_expression_mastered("e1").await?;
    Ok(())
}

#[tokio::test]
async fn save_selected_expressions_posts_the_selection() -> Result<()> {
    let router = Router::new().route(
        "/api/expressions/save-selected",
        post(|Json(selection): Json<Vec<Value>>| async move {
            if selection.len() == 1 && selection[0]["id"] == "x1" {
                Json(json!({"saved": 1})).into_response()
            } else {
                StatusCode::BAD_REQUEST.into_response()
            }
        }),
    );
    let addr = serve(router).await?;

    let client = BackendClient::new(format!("http://{}", addr));
    client
        .save_selected_expressions(&[lingua_live::ExtractedExpression {
            id: "x1".to_string(),
            expression: "go to the store".to_string(),
            meaning: "visit a shop".to_string(),
            example: "I go to the store every Sunday.".to_string(),
        }])
        .await?;
    Ok(())
}

#[tokio::test]
async fn sdp_exchange_posts_the_offer_with_bearer_credential() -> Result<()> {
    let router = Router::new().route(
        "/realtime",
        post(
            |Query(params): Query<std::collections::HashMap<String, String>>,
             headers: HeaderMap,
             body: String| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v == "Bearer ek_123")
                    .unwrap_or(false);
                let sdp_content = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.starts_with("application/sdp"))
                    .unwrap_or(false);
                let model_ok = params.get("model").map(|m| m == "test-model").unwrap_or(false);

                if authorized && sdp_content && model_ok && body.starts_with("v=0") {
                    "v=0\r\nanswer".into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            },
        ),
    );
    let addr = serve(router).await?;

    let negotiator = SdpNegotiator::new(
        format!("http://{}/realtime", addr),
        "test-model",
        Duration::from_secs(5),
    );
    let answer = negotiator
        .exchange(&EphemeralCredential::new("ek_123"), "v=0\r\noffer")
        .await?;
    assert_eq!(answer, "v=0\r\nanswer");
    Ok(())
}

#[tokio::test]
async fn rejected_sdp_exchange_is_a_negotiation_error() -> Result<()> {
    let router = Router::new().route(
        "/realtime",
        post(|| async { (StatusCode::FORBIDDEN, "bad credential") }),
    );
    let addr = serve(router).await?;

    let negotiator = SdpNegotiator::new(
        format!("http://{}/realtime", addr),
        "test-model",
        Duration::from_secs(5),
    );
    let err = negotiator
        .exchange(&EphemeralCredential::new("ek_bad"), "v=0\r\noffer")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Negotiation(_)));
    Ok(())
}

#[tokio::test]
async fn slow_sdp_exchange_times_out_as_a_negotiation_error() -> Result<()> {
    let router = Router::new().route(
        "/realtime",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "too late"
        }),
    );
    let addr = serve(router).await?;

    let negotiator = SdpNegotiator::new(
        format!("http://{}/realtime", addr),
        "test-model",
        Duration::from_millis(100),
    );
    let err = negotiator
        .exchange(&EphemeralCredential::new("ek_123"), "v=0\r\noffer")
        .await
        .unwrap_err();
    match err {
        SessionError::Negotiation(message) => assert!(message.contains("timed out")),
        other => panic!("unexpected error: {:?}", other),
    }
    Ok(())
}
