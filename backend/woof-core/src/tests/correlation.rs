// Unit tests for request/response correlation

use crate::correlation::{Reply, ResponseTable};
use crate::transport::ConnectionId;

use std::sync::Arc;
use std::time::Duration;

/// **VALUE**: Verifies a released waiter observes `Released`, not a timeout.
#[tokio::test]
async fn given_pending_waiter_when_draining_connection_then_released() {
    let table = Arc::new(ResponseTable::new());
    let connection = ConnectionId::allocate();
    let mut synchronizer = table.new_synchronizer(connection);

    let released = table.drain_connection(connection);
    let reply = synchronizer
        .wait(Duration::from_secs(1))
        .await
        .expect("released waiter should not time out");

    assert_eq!(released, 1);
    assert!(matches!(reply, Reply::Released));
}

/// **VALUE**: Verifies draining one connection leaves other connections' waiters.
///
/// **BUG THIS CATCHES**: Would catch one misbehaving client releasing requests
/// the server has pending on every other connection.
#[tokio::test]
async fn given_two_connections_when_draining_one_then_other_still_pending() {
    let table = Arc::new(ResponseTable::new());
    let first = ConnectionId::allocate();
    let second = ConnectionId::allocate();
    let _a = table.new_synchronizer(first);
    let b = table.new_synchronizer(second);

    table.drain_connection(first);

    assert_eq!(table.len(), 1);
    assert!(table.try_remove(&b.id(), second).is_some());
}

/// **VALUE**: Verifies a reply is only claimable from the connection it was sent on.
#[tokio::test]
async fn given_waiter_when_claiming_from_other_connection_then_not_found() {
    let table = Arc::new(ResponseTable::new());
    let owner = ConnectionId::allocate();
    let synchronizer = table.new_synchronizer(owner);

    assert!(table.try_remove(&synchronizer.id(), ConnectionId::allocate()).is_none());
    assert!(table.try_remove(&synchronizer.id(), owner).is_some());
}

/// **VALUE**: Verifies a timed-out waiter removes itself from the table.
///
/// **WHY THIS MATTERS**: Every unanswered request would otherwise leak an entry
/// for the lifetime of the connection.
#[tokio::test]
async fn given_unanswered_waiter_when_timing_out_and_dropped_then_table_empty() {
    let table = Arc::new(ResponseTable::new());
    {
        let mut synchronizer = table.new_synchronizer(ConnectionId::allocate());
        assert_eq!(table.len(), 1);
        assert!(synchronizer.wait(Duration::from_millis(20)).await.is_err());
    }

    assert!(table.is_empty());
}

/// **VALUE**: Verifies ids handed to concurrent waiters are distinct.
#[tokio::test]
async fn given_many_waiters_when_created_then_ids_unique() {
    let table = Arc::new(ResponseTable::new());
    let connection = ConnectionId::allocate();
    let synchronizers: Vec<_> = (0..64).map(|_| table.new_synchronizer(connection)).collect();

    let mut ids: Vec<_> = synchronizers.iter().map(|s| s.id()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 64);
    assert_eq!(table.len(), 64);
}
