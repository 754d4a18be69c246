//! The JSON hub client against a real local WebSocket server.
//!
//! Each test runs a tiny scripted hub: it accepts one connection, answers
//! the handshake, then reads invocations and writes completions or pushes
//! as the test needs.

#[cfg(feature = "websocket")]
mod json_hub {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use hubfeed::prelude::*;
    use hubfeed::{
        ClosedHandler, HubClient, HubConnector, HubError, JsonHubConfig, JsonHubConnector,
        WebSocketTransport, WireCodec,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    // =====================================================================
    // Scripted hub
    // =====================================================================

    /// Binds a listener and returns it with an `http://` URL; the
    /// transport rewrites the scheme.
    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have local addr");
        (listener, format!("http://{addr}/hub"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("upgrade should succeed")
    }

    /// Reads the next JSON frame, or `None` once the client is gone.
    async fn next_frame(ws: &mut ServerWs) -> Option<Value> {
        loop {
            match ws.next().await? {
                Ok(msg) if msg.is_text() || msg.is_binary() => {
                    let text = String::from_utf8(msg.into_data().to_vec()).unwrap();
                    let frame = text.trim_end_matches('\u{1e}');
                    return Some(serde_json::from_str(frame).unwrap());
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    async fn send_frame(ws: &mut ServerWs, frame: Value) {
        ws.send(Message::text(format!("{frame}\u{1e}")))
            .await
            .expect("server send");
    }

    /// Accepts one client and completes the handshake.
    async fn accept_hub(listener: &TcpListener) -> ServerWs {
        let mut ws = accept(listener).await;
        let handshake = next_frame(&mut ws).await.expect("handshake");
        assert_eq!(handshake, json!({"protocol": "json", "version": 1}));
        send_frame(&mut ws, json!({})).await;
        ws
    }

    /// Answers every invocation with `result` until the client leaves.
    async fn answer_all(mut ws: ServerWs, result: Value) {
        while let Some(frame) = next_frame(&mut ws).await {
            if frame["type"] == 1 {
                let id = frame["invocationId"].clone();
                send_frame(&mut ws, json!({"type": 3, "invocationId": id, "result": result}))
                    .await;
            }
        }
    }

    fn counting_closed() -> (Arc<AtomicUsize>, ClosedHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: ClosedHandler = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    fn connector(url: String) -> JsonHubConnector<WebSocketTransport> {
        JsonHubConnector::new(WebSocketTransport::new(url))
    }

    // =====================================================================
    // JsonHubClient
    // =====================================================================

    #[tokio::test]
    async fn test_invoke_resolves_with_completion_result() {
        let (listener, url) = bind_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            let frame = next_frame(&mut ws).await.unwrap();
            assert_eq!(frame["type"], 1);
            assert_eq!(frame["target"], "SubscribeTicker");
            assert_eq!(frame["arguments"], json!(["BTCUSD"]));
            let id = frame["invocationId"].clone();
            send_frame(&mut ws, json!({"type": 3, "invocationId": id, "result": true})).await;
            ws
        });

        let (_, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.start().await.unwrap();
        let result = client
            .invoke("SubscribeTicker", vec![json!("BTCUSD")])
            .await
            .unwrap();

        assert_eq!(result, json!(true));
        assert!(client.is_connected());
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_invoke_completion_error_is_invocation_error() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            let frame = next_frame(&mut ws).await.unwrap();
            let id = frame["invocationId"].clone();
            send_frame(
                &mut ws,
                json!({"type": 3, "invocationId": id, "error": "unknown market"}),
            )
            .await;
            answer_all(ws, json!(null)).await;
        });

        let (_, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.start().await.unwrap();
        let err = client.invoke("SubscribeTicker", vec![]).await.unwrap_err();

        match err {
            HubError::Invocation { method, reason } => {
                assert_eq!(method, "SubscribeTicker");
                assert_eq!(reason, "unknown market");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_push_routed_to_handler_case_insensitively() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            send_frame(&mut ws, json!({"type": 6})).await;
            send_frame(
                &mut ws,
                json!({"type": 1, "target": "SubscribeTicker", "arguments": ["abc"]}),
            )
            .await;
            answer_all(ws, json!(true)).await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.on(
            "subscribeticker",
            Arc::new(move |args: Vec<Value>| {
                let _ = tx.send(args);
            }),
        );
        client.start().await.unwrap();

        let args = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(args, vec![json!("abc")]);
    }

    #[tokio::test]
    async fn test_start_handshake_rejected_fails() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let _ = next_frame(&mut ws).await;
            send_frame(&mut ws, json!({"error": "protocol not supported"})).await;
        });

        let (closed, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        let err = client.start().await.unwrap_err();

        assert!(matches!(err, HubError::Connect(ref m) if m.contains("not supported")));
        assert!(!client.is_connected());
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_unreachable_endpoint_fails() {
        let (listener, url) = bind_server().await;
        drop(listener);

        let (_, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);

        assert!(matches!(client.start().await, Err(HubError::Connect(_))));
    }

    #[tokio::test]
    async fn test_server_drop_fails_pending_and_raises_closed_once() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            // Read the invocation, then vanish without answering.
            let _ = next_frame(&mut ws).await;
            drop(ws);
        });

        let (closed, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.start().await.unwrap();
        let err = client.invoke("SubscribeTicker", vec![]).await.unwrap_err();

        assert!(matches!(err, HubError::Closed));
        tokio::time::timeout(Duration::from_secs(5), async {
            while closed.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!client.is_connected());
        assert!(matches!(
            client.invoke("SubscribeTicker", vec![]).await,
            Err(HubError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_hub_close_frame_raises_closed() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            send_frame(&mut ws, json!({"type": 7, "error": "server shutting down"})).await;
            answer_all(ws, json!(true)).await;
        });

        let (closed, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while closed.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_unterminated_oversized_frame_raises_closed() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            let flood = "x".repeat(256);
            ws.send(Message::text(flood)).await.expect("server send");
            answer_all(ws, json!(true)).await;
        });

        let config = JsonHubConfig {
            max_frame_size: 64,
            ..JsonHubConfig::default()
        };
        let (closed, on_closed) = counting_closed();
        let client = JsonHubConnector::with_config(WebSocketTransport::new(url), config)
            .create(on_closed);
        client.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while closed.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_stop_does_not_raise_closed() {
        let (listener, url) = bind_server().await;
        let server = tokio::spawn(async move {
            let ws = accept_hub(&listener).await;
            answer_all(ws, json!(true)).await;
        });

        let (closed, on_closed) = counting_closed();
        let client = connector(url).create(on_closed);
        client.start().await.unwrap();
        client.stop(Duration::from_secs(1)).await;

        // The server loop ends once the socket closes.
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert!(matches!(
            client.start().await,
            Err(HubError::Connect(_))
        ));
    }

    // =====================================================================
    // HubManager end to end
    // =====================================================================

    #[tokio::test]
    async fn test_manager_open_receives_decoded_push() {
        let (listener, url) = bind_server().await;
        tokio::spawn(async move {
            let mut ws = accept_hub(&listener).await;
            let frame = next_frame(&mut ws).await.unwrap();
            assert_eq!(frame["target"], "SubscribeToExchangeDeltas");
            let id = frame["invocationId"].clone();
            send_frame(&mut ws, json!({"type": 3, "invocationId": id, "result": true})).await;

            let payload = WireCodec.encode(r#"{"MarketName":"BTC-USD","Nonce":7}"#).unwrap();
            send_frame(
                &mut ws,
                json!({"type": 1, "target": "SubscribeToExchangeDeltas", "arguments": [payload]}),
            )
            .await;
            answer_all(ws, json!(true)).await;
        });

        let manager = HubManagerBuilder::new()
            .map_function("deltas", "SubscribeToExchangeDeltas")
            .websocket(url);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = manager
            .open(
                "deltas",
                move |text| {
                    let _ = tx.send(text.to_string());
                },
                vec![json!("BTC-USD")],
            )
            .await
            .unwrap();

        let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, r#"{"MarketName":"BTC-USD","Nonce":7}"#);
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.close(handle).await;
        assert_eq!(manager.state(), ConnectionState::Idle);
    }
}
