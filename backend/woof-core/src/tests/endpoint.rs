// Unit tests for the shared endpoint: correlation, timeouts, error replies
// and lifecycle, driven through a client against an in-memory server

use crate::client::WoofClient;
use crate::codec::{DecodedMessage, WoofCodec};
use crate::endpoint::{EndpointState, MessageHandler, RequestContext};
use crate::error::endpoint::EndpointError;
use crate::proto::{ErrorCode, ErrorResponse, PingRequest, PingResponse};
use crate::registry::MessageRegistry;
use crate::session::SessionProvider;
use crate::tests::support::{
    EchoHandler, EchoRequest, EchoResponse, FailingHandler, Stranger, connect_client,
    detached_server, test_config, test_registry,
};
use crate::transport::MemoryTransport;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

/// Pings the caller back over the same connection before answering an echo.
struct PingBackHandler;

#[async_trait]
impl MessageHandler for PingBackHandler {
    async fn handle(
        &self,
        request: &RequestContext,
        message: &DecodedMessage,
    ) -> Result<(), EndpointError> {
        let Some(echo) = message.downcast_ref::<EchoRequest>() else {
            return Ok(());
        };

        let ping = PingRequest {
            sent_at: Some(SystemTime::now().into()),
        };
        let _: PingResponse = request
            .endpoint()
            .send_and_receive(request.transport().as_ref(), &ping, Some(Duration::from_secs(1)))
            .await?;

        request
            .reply(&EchoResponse {
                text: format!("{} after ping", echo.text),
            })
            .await
    }
}

/// **VALUE**: Verifies a ping round-trips and reports a duration.
#[tokio::test]
async fn given_connected_client_when_pinging_then_returns_duration() {
    let server = detached_server(test_config());
    let (client, _) = connect_client(&server, test_config()).await;

    let elapsed = client.ping().await.expect("ping should succeed");

    assert!(elapsed < Duration::from_secs(2));
}

/// **VALUE**: Verifies concurrent requests each receive their own reply.
///
/// **BUG THIS CATCHES**: Would catch replies resolved in arrival order rather
/// than by message id.
#[tokio::test]
async fn given_concurrent_requests_when_replies_arrive_then_each_caller_gets_its_own() {
    let server = detached_server(test_config());
    server.add_message_handler(Arc::new(EchoHandler));
    let (client, _) = connect_client(&server, test_config()).await;

    let first = EchoRequest {
        text: "first".to_string(),
    };
    let second = EchoRequest {
        text: "second".to_string(),
    };
    let (a, b) = tokio::join!(
        client.send_and_receive::<_, EchoResponse>(&first, None),
        client.send_and_receive::<_, EchoResponse>(&second, None),
    );

    assert_eq!(a.expect("first should succeed").text, "first");
    assert_eq!(b.expect("second should succeed").text, "second");
    assert!(client.endpoint().responses().is_empty());
}

/// **VALUE**: Verifies a handler can wait on its own peer while answering.
///
/// **WHY THIS MATTERS**: The receive loop is the only reader of a connection;
/// if handlers ran on it, the reply the handler waits for would never be read.
///
/// **BUG THIS CATCHES**: Would catch handlers awaited inline on the receive
/// loop, which turns this exchange into a timeout.
#[tokio::test]
async fn given_handler_pinging_caller_when_requesting_then_reply_arrives() {
    // GIVEN: A server whose handler pings the client before replying
    let server = detached_server(test_config());
    server.add_message_handler(Arc::new(PingBackHandler));
    let (client, _) = connect_client(&server, test_config()).await;

    // WHEN: The client sends an echo
    let reply: EchoResponse = client
        .send_and_receive(
            &EchoRequest {
                text: "hello".to_string(),
            },
            Some(Duration::from_secs(3)),
        )
        .await
        .expect("handler should get its ping answered and reply");

    // THEN: The nested round trip completed and nothing is left pending
    assert_eq!(reply.text, "hello after ping");
    assert!(server.endpoint().responses().is_empty());
    assert!(client.endpoint().responses().is_empty());
}

/// **VALUE**: Verifies an unanswered request times out and leaves no entry behind.
///
/// **WHY THIS MATTERS**: A silent peer must not hang callers or grow the
/// correlation table without bound.
#[tokio::test]
async fn given_silent_peer_when_sending_request_then_timeout_and_no_leak() {
    // GIVEN: A client whose peer never answers
    let (client_end, _silent_end) = MemoryTransport::pair();
    let client = WoofClient::with_registry(test_config(), test_registry());
    client
        .start_with_transport(Arc::new(client_end))
        .await
        .expect("client should start");

    // WHEN: Sending with a short timeout
    let result = client
        .send_and_receive::<_, EchoResponse>(
            &EchoRequest {
                text: "anyone?".to_string(),
            },
            Some(Duration::from_millis(50)),
        )
        .await;

    // THEN: Timeout, and the table is empty again
    assert!(matches!(result, Err(EndpointError::Timeout { .. })));
    assert!(client.endpoint().responses().is_empty());
}

/// **VALUE**: Verifies one failing handler does not stop the handlers after it.
///
/// **BUG THIS CATCHES**: Would catch the first error short-circuiting the
/// handler list or killing the receive loop.
#[tokio::test]
async fn given_failing_handler_before_echo_when_requesting_then_echo_still_replies() {
    let server = detached_server(test_config());
    server.add_message_handler(Arc::new(FailingHandler));
    server.add_message_handler(Arc::new(EchoHandler));
    let (client, _) = connect_client(&server, test_config()).await;

    let response = client
        .send_and_receive::<_, EchoResponse>(
            &EchoRequest {
                text: "boom".to_string(),
            },
            None,
        )
        .await
        .expect("echo handler should still reply");

    assert_eq!(response.text, "boom");
    client.ping().await.expect("ping after handler failure");
}

/// **VALUE**: Verifies a lone failing handler surfaces as `Remote(InternalError)`.
#[tokio::test]
async fn given_only_failing_handler_when_requesting_then_internal_error() {
    let server = detached_server(test_config());
    server.add_message_handler(Arc::new(FailingHandler));
    let (client, _) = connect_client(&server, test_config()).await;

    let result = client
        .send_and_receive::<_, EchoResponse>(
            &EchoRequest {
                text: "boom".to_string(),
            },
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(EndpointError::Remote {
            code: ErrorCode::InternalError,
            native_code: 9,
            ..
        })
    ));
}

/// **VALUE**: Verifies a server with no application handler answers NotImplemented.
#[tokio::test]
async fn given_no_handler_when_requesting_then_not_implemented() {
    let server = detached_server(test_config());
    let (client, _) = connect_client(&server, test_config()).await;

    let result = client
        .send_and_receive::<_, EchoResponse>(
            &EchoRequest {
                text: "hello".to_string(),
            },
            None,
        )
        .await;

    assert!(matches!(
        result,
        Err(EndpointError::Remote {
            code: ErrorCode::NotImplemented,
            ..
        })
    ));
}

/// **VALUE**: Verifies an unknown type gets an error reply and the connection survives.
#[tokio::test]
async fn given_unknown_type_when_requesting_then_unknown_type_error_and_connection_open() {
    let server = detached_server(test_config());
    let registry = Arc::new(
        MessageRegistry::builder()
            .register::<Stranger>()
            .and_then(|builder| builder.register::<EchoResponse>())
            .expect("registry should build")
            .build(),
    );
    let (client_end, server_end) = MemoryTransport::pair();
    server
        .attach(Arc::new(server_end))
        .await
        .expect("attach should succeed");
    let client = WoofClient::with_registry(test_config(), registry);
    client
        .start_with_transport(Arc::new(client_end))
        .await
        .expect("client should start");

    let result = client
        .send_and_receive::<_, EchoResponse>(&Stranger { blob: vec![1, 2, 3] }, None)
        .await;

    assert!(matches!(
        result,
        Err(EndpointError::Remote {
            code: ErrorCode::UnknownMessageType,
            ..
        })
    ));
    client.ping().await.expect("connection should stay open");
}

/// **VALUE**: Verifies an oversized request closes the connection.
///
/// **WHY THIS MATTERS**: The oversized payload is never read, so the stream can
/// no longer be trusted; the core enforces the close.
#[tokio::test]
async fn given_request_above_server_limit_when_sending_then_connection_closed() {
    let mut server_config = test_config();
    server_config.limits.max_message_size = 64;
    server_config.limits.stream_fragment_size = 64;
    let server = detached_server(server_config);
    server.add_message_handler(Arc::new(EchoHandler));
    let (client, _) = connect_client(&server, test_config()).await;

    let result = client
        .send_and_receive::<_, EchoResponse>(
            &EchoRequest {
                text: "x".repeat(500),
            },
            None,
        )
        .await;

    assert!(result.expect_err("oversized request should fail").is_timeout());
    for _ in 0..50 {
        if server.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.connection_count().await, 0);
    assert!(!client.is_connected().await);
}

/// **VALUE**: Verifies an uncorrelated error releases pending waiters at once.
#[tokio::test]
async fn given_pending_request_when_uncorrelated_error_arrives_then_no_reply() {
    // GIVEN: A client talking to a raw peer
    let (client_end, peer_end) = MemoryTransport::pair();
    let client = Arc::new(WoofClient::with_registry(test_config(), test_registry()));
    client
        .start_with_transport(Arc::new(client_end))
        .await
        .expect("client should start");

    let waiting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .send_and_receive::<_, EchoResponse>(
                    &EchoRequest {
                        text: "wait".to_string(),
                    },
                    Some(Duration::from_secs(5)),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // WHEN: The peer sends a connection-wide error
    let peer_codec = WoofCodec::new(
        test_registry(),
        Arc::new(SessionProvider::single()),
        None,
        8192,
    );
    peer_codec
        .send_uncorrelated(
            &peer_end,
            &ErrorResponse {
                code: ErrorCode::InternalError as i32,
                native_code: 0,
                description: "state lost".to_string(),
            },
        )
        .await
        .expect("peer send should succeed");

    // THEN: The waiter is released without a reply
    let result = waiting.await.expect("task should not panic");
    assert!(matches!(result, Err(EndpointError::NoReply { .. })));
}

/// **VALUE**: Verifies an endpoint cannot be started twice or stopped before start.
#[tokio::test]
async fn given_lifecycle_misuse_when_starting_or_stopping_then_invalid_state() {
    let client = WoofClient::with_registry(test_config(), test_registry());
    assert!(matches!(
        client.stop().await,
        Err(EndpointError::InvalidState { .. })
    ));

    let (client_end, _peer_end) = MemoryTransport::pair();
    client
        .start_with_transport(Arc::new(client_end))
        .await
        .expect("first start should succeed");
    assert_eq!(client.state(), EndpointState::Started);

    let (again, _peer) = MemoryTransport::pair();
    assert!(matches!(
        client.start_with_transport(Arc::new(again)).await,
        Err(EndpointError::InvalidState { .. })
    ));

    client.stop().await.expect("stop should succeed");
    assert_eq!(client.state(), EndpointState::Stopped);

    let (after_stop, _peer) = MemoryTransport::pair();
    assert!(matches!(
        client.start_with_transport(Arc::new(after_stop)).await,
        Err(EndpointError::InvalidState { .. })
    ));
}

/// **VALUE**: Verifies requests on a stopped client fail fast.
#[tokio::test]
async fn given_unstarted_client_when_pinging_then_not_connected() {
    let client = WoofClient::with_registry(test_config(), test_registry());

    assert!(matches!(
        client.ping().await,
        Err(EndpointError::NotConnected { .. })
    ));
}
