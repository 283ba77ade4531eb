// Unit tests for sessions and the static authentication backend

use crate::session::auth::AuthenticationBackend;
use crate::session::{SessionMode, SessionProvider};
use crate::tests::support::{API_KEY, API_SECRET, test_auth};
use crate::transport::ConnectionId;

use common::RedactedSecret;

/// **VALUE**: Verifies server-side sessions are isolated per connection.
///
/// **WHY THIS MATTERS**: A key bound by one client's sign-in must never sign or
/// verify traffic on another connection.
///
/// **BUG THIS CATCHES**: Would catch sessions keyed by something shared.
#[tokio::test]
async fn given_per_connection_provider_when_setting_key_then_other_connection_unaffected() {
    // GIVEN: Two connections on one provider
    let provider = SessionProvider::per_connection();
    let first = ConnectionId::allocate();
    let second = ConnectionId::allocate();

    // WHEN: Only the first gets a key
    provider.session(first).await.write().await.key = Some(RedactedSecret::from("k"));

    // THEN: The second has none
    assert!(provider.get_key(first).await.is_some());
    assert!(provider.get_key(second).await.is_none());
    assert_eq!(provider.open_sessions().await, 1);
}

/// **VALUE**: Verifies closing a session forgets its key.
#[tokio::test]
async fn given_keyed_session_when_closed_then_key_is_gone() {
    let provider = SessionProvider::per_connection();
    let connection = ConnectionId::allocate();
    provider.session(connection).await.write().await.key = Some(RedactedSecret::from("k"));

    provider.close_session(connection).await;

    assert_eq!(provider.open_sessions().await, 0);
    assert!(provider.get_key(connection).await.is_none());
}

/// **VALUE**: Verifies key lookups never reopen a closed connection's session.
///
/// **WHY THIS MATTERS**: A send racing a disconnect still asks for the signing
/// key; the session map must not grow with connections that are already gone.
///
/// **BUG THIS CATCHES**: Would catch `get_key` creating sessions on demand.
#[tokio::test]
async fn given_closed_session_when_getting_key_then_no_session_is_reopened() {
    // GIVEN: A connection whose session was opened and then closed
    let provider = SessionProvider::per_connection();
    let connection = ConnectionId::allocate();
    provider.session(connection).await.write().await.key = Some(RedactedSecret::from("k"));
    provider.close_session(connection).await;

    // WHEN: A late send looks up the signing key
    let key = provider.get_key(connection).await;

    // THEN: Nothing is found and nothing is recreated
    assert!(key.is_none());
    assert!(provider.find(connection).await.is_none());
    assert_eq!(provider.open_sessions().await, 0);
}

/// **VALUE**: Verifies the client-side provider shares one session for all ids.
#[tokio::test]
async fn given_single_provider_when_reading_any_connection_then_same_session() {
    let provider = SessionProvider::single();
    assert_eq!(provider.mode(), SessionMode::Single);

    provider
        .session(ConnectionId::allocate())
        .await
        .write()
        .await
        .key = Some(RedactedSecret::from("shared"));

    let key = provider
        .get_key(ConnectionId::allocate())
        .await
        .expect("single session should be shared");
    assert_eq!(key.as_bytes(), b"shared");
}

/// **VALUE**: Verifies the static backend answers the three sign-in lookups.
#[tokio::test]
async fn given_static_backend_when_looking_up_known_key_then_user_key_and_client_found() {
    let auth = test_auth();

    let user = auth
        .get_user_for_api_key(API_KEY)
        .await
        .expect("lookup should not fail")
        .expect("user should exist");
    let key = auth
        .get_key_for_api_key(API_KEY)
        .await
        .expect("lookup should not fail")
        .expect("key should exist");
    let client = auth
        .get_client_by_id(&user.client_id)
        .await
        .expect("lookup should not fail");

    assert_eq!(key.as_bytes(), API_SECRET.as_bytes());
    assert!(client.is_some());
    assert!(
        auth.get_user_for_api_key("nope")
            .await
            .expect("lookup should not fail")
            .is_none()
    );
}
