use super::*;
use crate::{
    config::ConnectOptions,
    testing::{ConnectBehavior, MockHandle, MockTransport},
    transport::Transport,
};
use tokio::sync::mpsc::error::TryRecvError;

/// The sender stands in for the manager's handles: the connection's weak
/// back-reference only upgrades while it is alive.
fn new_connection() -> (
    Connection<MockHandle>,
    mpsc::Sender<ManagerCommand>,
    mpsc::Receiver<ManagerCommand>,
) {
    let (tx, rx) = mpsc::channel(8);
    let connection = Connection::new(ConnectionId::new(1), tx.downgrade());
    (connection, tx, rx)
}

async fn mock_handle() -> Arc<MockHandle> {
    let transport = MockTransport::new(ConnectBehavior::Succeed);
    Arc::new(
        transport
            .connect("amqp://ns:pw@localhost", &ConnectOptions::default())
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_happy_path_lifecycle() {
    let (connection, _tx, _rx) = new_connection();
    let mut events = connection.subscribe();
    assert_eq!(connection.state(), ConnectionState::Waiting);
    assert!(connection.transport().is_none());

    assert!(connection.begin_connecting());
    assert_eq!(connection.state(), ConnectionState::Connecting);

    assert!(connection.install(mock_handle().await));
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.transport().is_some());
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);

    assert!(connection.begin_retiring());
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Retiring);
    // Still usable by in-flight work while draining.
    assert!(connection.transport().is_some());

    assert!(connection.finish().is_some());
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Finished);
    assert_eq!(connection.state(), ConnectionState::Finished);
    assert!(connection.transport().is_none());
}

#[tokio::test]
async fn test_retiring_twice_emits_once() {
    let (connection, _tx, _rx) = new_connection();
    let mut events = connection.subscribe();

    assert!(connection.begin_retiring());
    assert!(!connection.begin_retiring());
    assert!(connection.finish().is_none());
    assert!(connection.finish().is_none());

    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Retiring);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Finished);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_install_after_retirement_is_refused() {
    let (connection, _tx, _rx) = new_connection();
    let mut events = connection.subscribe();

    assert!(connection.begin_connecting());
    assert!(connection.begin_retiring());
    assert!(!connection.install(mock_handle().await));

    assert_eq!(connection.state(), ConnectionState::Retiring);
    assert!(connection.transport().is_none());
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Retiring);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_waiting_cannot_skip_to_connected() {
    let (connection, _tx, _rx) = new_connection();
    assert!(!connection.install(mock_handle().await));
    assert_eq!(connection.state(), ConnectionState::Waiting);
}

#[tokio::test]
async fn test_waiters_resolve_on_state() {
    let (connection, _tx, _rx) = new_connection();

    let retiring = tokio::spawn({
        let connection = connection.clone();
        async move { connection.retiring().await }
    });
    let finished = tokio::spawn({
        let connection = connection.clone();
        async move { connection.finished().await }
    });
    tokio::task::yield_now().await;
    assert!(!retiring.is_finished());

    connection.begin_retiring();
    retiring.await.unwrap();
    assert!(!finished.is_finished());

    connection.finish();
    finished.await.unwrap();

    // Already past both states: resolve immediately.
    connection.retiring().await;
    connection.finished().await;
}

#[tokio::test]
async fn test_failed_reports_to_manager_until_retired() {
    let (connection, _tx, mut rx) = new_connection();

    connection.failed().await;
    assert!(matches!(
        rx.try_recv(),
        Ok(ManagerCommand::ConnectionFailed { id }) if id == connection.id()
    ));

    connection.begin_retiring();
    connection.failed().await;
    connection.retire().await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_retire_asks_manager() {
    let (connection, _tx, mut rx) = new_connection();
    connection.retire().await;
    assert!(matches!(
        rx.try_recv(),
        Ok(ManagerCommand::Retire { id }) if id == connection.id()
    ));
}

#[tokio::test]
async fn test_failed_without_manager_is_ignored() {
    let (tx, rx) = mpsc::channel(1);
    let connection: Connection<MockHandle> = Connection::new(ConnectionId::new(7), tx.downgrade());
    drop(tx);
    drop(rx);

    connection.failed().await;
    connection.retire().await;
    assert_eq!(connection.state(), ConnectionState::Waiting);
}

#[test]
fn test_ids_and_equality() {
    let (tx, _rx) = mpsc::channel(1);
    let a: Connection<MockHandle> = Connection::new(ConnectionId::new(3), tx.downgrade());
    let b = Connection::new(ConnectionId::new(3), tx.downgrade());

    assert_eq!(a.id().to_string(), "conn-3");
    assert_eq!(a.id().as_u64(), 3);
    assert_eq!(a, a.clone());
    // Same id, different connection.
    assert_ne!(a, b);
}
