//! Websocket tests for the SSI API client.
//!
//! These run against a local in-process websocket server, so no real API
//! server is needed.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use ssi_api_client::client::ApiClient;
use ssi_api_client::config::Config;
use ssi_api_client::error::Error;
use ssi_api_client::ws::WsOptions;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

/// Binds a listener on an ephemeral port and returns it together with the
/// matching HTTP base URL for the client configuration.
async fn local_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

#[tokio::test]
async fn round_trips_one_json_frame() {
    let (listener, base) = local_server().await;
    let seen_token: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let slot = seen_token.clone();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| {
            *slot.lock().unwrap() = request
                .headers()
                .get("X-Paf-Token")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };
        let mut socket = accept_hdr_async(stream, callback).await.unwrap();
        if let Some(Ok(Message::Text(text))) = socket.next().await {
            socket.send(Message::Text(text)).await.unwrap();
        }
        // Drain until the client closes.
        while let Some(Ok(_)) = socket.next().await {}
    });

    let config = Config::new(base).with_token("tok");
    let client = ApiClient::new(config).unwrap();
    let mut socket = client
        .ws("chat", json!({"room": "a b"}), WsOptions::default())
        .await
        .unwrap();
    socket.send_json(&json!({"hello": "world"})).await.unwrap();
    assert_eq!(socket.recv_json().await.unwrap(), json!({"hello": "world"}));
    socket.close().await.unwrap();
    server.await.unwrap();

    // The auth headers ride along on the handshake request.
    assert_eq!(seen_token.lock().unwrap().as_deref(), Some("tok"));
}

#[tokio::test]
async fn non_json_text_frame_fails_with_json_error() {
    let (listener, base) = local_server().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        socket.send(Message::Text("not json".into())).await.unwrap();
        while let Some(Ok(_)) = socket.next().await {}
    });

    let client = ApiClient::new(Config::new(base)).unwrap();
    let mut socket = client.ws("chat", json!({}), WsOptions::default()).await.unwrap();
    match socket.recv_json().await {
        Err(Error::Json(_)) => {}
        other => panic!("expected Json error, got {:?}", other),
    }
}

#[tokio::test]
async fn non_text_frame_fails_with_message_error() {
    let (listener, base) = local_server().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        socket.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        while let Some(Ok(_)) = socket.next().await {}
    });

    let client = ApiClient::new(Config::new(base)).unwrap();
    let mut socket = client.ws("chat", json!({}), WsOptions::default()).await.unwrap();
    match socket.recv_json().await {
        Err(Error::Message(msg)) => assert!(msg.contains("text frame")),
        other => panic!("expected Message error, got {:?}", other),
    }
}

#[tokio::test]
async fn closed_socket_fails_with_message_error() {
    let (listener, base) = local_server().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        socket.close(None).await.unwrap();
        while let Some(Ok(_)) = socket.next().await {}
    });

    let client = ApiClient::new(Config::new(base)).unwrap();
    let mut socket = client.ws("chat", json!({}), WsOptions::default()).await.unwrap();
    match socket.recv_json().await {
        Err(Error::Message(_)) => {}
        other => panic!("expected Message error, got {:?}", other),
    }
}

#[tokio::test]
async fn connect_timeout_elapses_without_a_handshake_answer() {
    // The listener is never accepted from: the TCP connect succeeds via the
    // backlog, but the websocket handshake gets no answer.
    let (listener, base) = local_server().await;

    let client = ApiClient::new(Config::new(base)).unwrap();
    let options = WsOptions::default().timeout(Duration::from_millis(200));
    match client.ws("chat", json!({}), options).await {
        Err(Error::ConnectTimeout) => {}
        Err(other) => panic!("expected ConnectTimeout, got {:?}", other),
        Ok(_) => panic!("expected ConnectTimeout, got a connection"),
    }
    drop(listener);
}
