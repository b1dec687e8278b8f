mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{settle, MockEngine};
use futures::{SinkExt, StreamExt};
use stt_relay::{create_router, AppState, Config};
use tokio_tungstenite::tungstenite::{self, Message};
use tower::ServiceExt;

fn state_with(engine: MockEngine, max_sessions: usize) -> AppState {
    let mut cfg = Config::default();
    cfg.service.max_sessions = max_sessions;
    AppState::new(Arc::new(engine), &cfg)
}

async fn serve(state: AppState) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    Ok(format!("ws://{}/ws", addr))
}

async fn next_text<S>(socket: &mut S) -> String
where
    S: StreamExt<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for relay")
            .expect("relay closed the stream")
            .expect("relay connection failed");
        match frame {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_keep_alive() -> Result<()> {
    let app = create_router(state_with(MockEngine::new(), 0));

    let response = app
        .oneshot(Request::builder().uri("/keep-alive").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"Server is awake!");
    Ok(())
}

#[tokio::test]
async fn test_health_reports_active_sessions() -> Result<()> {
    let app = create_router(state_with(MockEngine::new(), 0));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let health: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["service"], "stt-relay");
    assert_eq!(health["activeSessions"], 0);
    Ok(())
}

#[tokio::test]
async fn test_plain_get_on_ws_route_is_not_upgraded() -> Result<()> {
    let app = create_router(state_with(MockEngine::new(), 0));

    let response = app
        .oneshot(Request::builder().uri("/ws").body(Body::empty())?)
        .await?;

    assert!(response.status().is_client_error());
    Ok(())
}

#[tokio::test]
async fn test_relay_end_to_end() -> Result<()> {
    let engine = MockEngine::new();
    let state = state_with(engine.clone(), 0);
    let url = serve(state.clone()).await?;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;

    socket
        .send(Message::Text(
            r#"{"type":"config","language":"en-US","enableAutoDetection":false}"#.to_string(),
        ))
        .await?;
    assert_eq!(next_text(&mut socket).await, r#"{"type":"ready"}"#);
    assert_eq!(state.active_sessions(), 1);

    socket.send(Message::Binary(vec![0u8; 3200])).await?;
    settle().await;
    assert_eq!(engine.writes(), vec![vec![0u8; 3200]]);

    engine.transcript("hel", false).await;
    engine.transcript("hello", true).await;
    assert_eq!(
        next_text(&mut socket).await,
        r#"{"type":"transcript","transcript":"hel","isFinal":false}"#
    );
    assert_eq!(
        next_text(&mut socket).await,
        r#"{"type":"transcript","transcript":"hello","isFinal":true}"#
    );

    socket.close(None).await?;
    settle().await;
    settle().await;

    assert_eq!(engine.ends(), 1);
    assert_eq!(state.active_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_closes_with_policy_code() -> Result<()> {
    let engine = MockEngine::new();
    let url = serve(state_with(engine.clone(), 0)).await?;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await?;
    socket
        .send(Message::Text(
            r#"{"type":"config","language":"???","enableAutoDetection":false}"#.to_string(),
        ))
        .await?;

    let reply: serde_json::Value = serde_json::from_str(&next_text(&mut socket).await)?;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "invalid_config");

    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await?
        .expect("relay closed the stream without a close frame")?;
    match frame {
        Message::Close(Some(close)) => assert_eq!(u16::from(close.code), 1008),
        other => panic!("expected close frame, got {:?}", other),
    }

    assert_eq!(engine.opens(), 0);
    Ok(())
}

#[tokio::test]
async fn test_session_limit_refuses_upgrade() -> Result<()> {
    let state = state_with(MockEngine::new(), 1);
    let url = serve(state.clone()).await?;

    let (_first, _) = tokio_tungstenite::connect_async(url.clone()).await?;
    settle().await;
    assert_eq!(state.active_sessions(), 1);

    match tokio_tungstenite::connect_async(url).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("second session should be refused"),
    }
    Ok(())
}
