//! Integration tests for `ConnectionManager`, driven by the in-memory
//! transport and paused tokio time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chatwire_protocol::{Credentials, UserId};
use chatwire_session::{
    ConnectOptions, ConnectionEvent, ConnectionManager, SessionConfig, SessionError, SessionState,
};
use chatwire_transport::{MemoryTransport, OpenBehavior, Transport, TransportError};

fn manager(transport: MemoryTransport) -> ConnectionManager<MemoryTransport> {
    ConnectionManager::new(Arc::new(transport), SessionConfig::default())
}

fn manager_with_credentials(transport: MemoryTransport) -> ConnectionManager<MemoryTransport> {
    let config = SessionConfig {
        credentials: Some(Credentials::password("bot", "pass")),
        ..SessionConfig::default()
    };
    ConnectionManager::new(Arc::new(transport), config)
}

fn short_timeout() -> ConnectOptions {
    ConnectOptions::new().timeout(Duration::from_millis(50))
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_success_sets_connected_and_emits_event() {
    let manager = manager(MemoryTransport::new());
    let mut events = manager.subscribe_events();

    let session = manager
        .connect(ConnectOptions::new().host("https://chat.example.com/"))
        .await
        .expect("connect should succeed");

    assert_eq!(session.state, SessionState::Connected);
    assert!(manager.is_connected());
    assert_eq!(manager.transport().last_host().as_deref(), Some("chat.example.com"));
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_never_opening_times_out() {
    let manager = manager(MemoryTransport::new().with_open(OpenBehavior::Never));
    let started = tokio::time::Instant::now();

    let result = manager.connect(short_timeout()).await;

    let elapsed = started.elapsed();
    assert!(
        matches!(result, Err(SessionError::Timeout(d)) if d == Duration::from_millis(50)),
        "got {result:?}"
    );
    assert!(
        elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(60),
        "failed after {elapsed:?}"
    );
    assert_eq!(manager.session().state, SessionState::TimedOut);
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_late_success_is_closed_again() {
    let manager = manager(
        MemoryTransport::new().with_open(OpenBehavior::Delay(Duration::from_millis(100))),
    );

    let result = manager.connect(short_timeout()).await;
    assert!(matches!(result, Err(SessionError::Timeout(_))));

    // Let the slow open finish after the timer has already won.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(manager.transport().close_count(), 1);
    assert!(!manager.transport().is_connected());
    assert_eq!(manager.session().state, SessionState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_timeout_can_succeed() {
    let manager = manager(
        MemoryTransport::new().with_open(OpenBehavior::Delay(Duration::from_millis(100))),
    );

    assert!(manager.connect(short_timeout()).await.is_err());

    let retry = manager
        .connect(ConnectOptions::new().timeout(Duration::from_secs(1)))
        .await;

    assert!(retry.is_ok(), "got {retry:?}");
    assert_eq!(manager.session().state, SessionState::Connected);
    assert_eq!(manager.transport().open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_late_open_of_timed_out_attempt_leaves_retry_connected() {
    let manager = manager(
        MemoryTransport::new().with_open(OpenBehavior::Delay(Duration::from_millis(100))),
    );

    let result = manager.connect(short_timeout()).await;
    assert!(matches!(result, Err(SessionError::Timeout(_))), "got {result:?}");

    manager.transport().set_open(OpenBehavior::Immediate);
    manager
        .connect(short_timeout())
        .await
        .expect("retry should connect");

    // The first attempt's open finishes now, after the retry won.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(manager.is_connected());
    assert_eq!(manager.transport().close_count(), 0);
    assert_eq!(manager.session().state, SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_dropped_future_resets_state() {
    let manager = manager(MemoryTransport::new().with_open(OpenBehavior::Never));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), manager.connect(short_timeout())).await;
    assert!(abandoned.is_err(), "outer timeout should elapse first");
    assert_eq!(manager.session().state, SessionState::Disconnected);

    manager.transport().set_open(OpenBehavior::Immediate);
    let again = manager.connect(short_timeout()).await;

    assert!(again.is_ok(), "got {again:?}");
    assert!(manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_dropped_future_closes_late_open() {
    let manager = manager(
        MemoryTransport::new().with_open(OpenBehavior::Delay(Duration::from_millis(100))),
    );

    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), manager.connect(short_timeout())).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(manager.transport().close_count(), 1);
    assert!(!manager.transport().is_connected());
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_open_failure_returns_transport_error() {
    let manager = manager(MemoryTransport::new().with_open(OpenBehavior::Fail("refused".into())));

    let result = manager.connect(ConnectOptions::new()).await;

    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::ConnectFailed(_)))
    ));
    assert_eq!(manager.session().state, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connecting_returns_already_connecting() {
    let manager = manager(
        MemoryTransport::new().with_open(OpenBehavior::Delay(Duration::from_millis(100))),
    );

    let (first, second) = tokio::join!(
        manager.connect(ConnectOptions::new()),
        manager.connect(ConnectOptions::new()),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(SessionError::AlreadyConnecting)));
    assert_eq!(manager.transport().open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_when_connected_reuses_session() {
    let manager = manager(MemoryTransport::new());

    manager.connect(ConnectOptions::new()).await.unwrap();
    let again = manager.connect(ConnectOptions::new()).await.unwrap();

    assert_eq!(again.state, SessionState::Connected);
    assert_eq!(manager.transport().open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_with_callback_invoked_once_on_success_and_failure() {
    let calls = AtomicUsize::new(0);

    let ok = manager(MemoryTransport::new());
    let result = ok
        .connect_with_callback(ConnectOptions::new(), |outcome| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(outcome.is_ok());
        })
        .await;
    assert!(result.is_ok());

    let failing = manager(MemoryTransport::new().with_open(OpenBehavior::Never));
    let result = failing
        .connect_with_callback(short_timeout(), |outcome| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(matches!(outcome, Err(SessionError::Timeout(_))));
        })
        .await;
    assert!(result.is_err());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =========================================================================
// Login / logout / disconnect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_without_credentials_returns_missing_credentials() {
    let manager = manager(MemoryTransport::new());

    let result = manager.login(None).await;

    assert!(matches!(result, Err(SessionError::MissingCredentials)));
    assert_eq!(manager.transport().open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_connects_first_and_records_user() {
    let manager = manager_with_credentials(MemoryTransport::new().with_user("bot", "pass", "u1"));
    let mut events = manager.subscribe_events();

    let user_id = manager.login(None).await.expect("login should succeed");

    assert_eq!(user_id, UserId::from("u1"));
    assert_eq!(manager.user_id(), Some(UserId::from("u1")));
    assert_eq!(manager.transport().open_count(), 1);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Connected);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::LoggedIn(UserId::from("u1")));
}

#[tokio::test(start_paused = true)]
async fn test_login_explicit_credentials_override_config() {
    let manager = manager_with_credentials(
        MemoryTransport::new()
            .with_user("bot", "pass", "u1")
            .with_user("other", "secret", "u2"),
    );

    let user_id = manager
        .login(Some(Credentials::password("other", "secret")))
        .await
        .unwrap();

    assert_eq!(user_id, UserId::from("u2"));
    assert_eq!(
        manager.transport().last_login().map(|c| c.username().to_string()),
        Some("other".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_login_wrong_password_returns_auth_failed() {
    let manager = manager(MemoryTransport::new().with_user("bot", "pass", "u1"));

    let result = manager.login(Some(Credentials::password("bot", "nope"))).await;

    assert!(matches!(result, Err(SessionError::AuthFailed(_))));
    assert_eq!(manager.user_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_logout_unsubscribes_and_clears_user() {
    let manager = manager_with_credentials(MemoryTransport::new().with_user("bot", "pass", "u1"));
    manager.login(None).await.unwrap();
    manager.transport().subscribe("stream-a", Vec::new()).await.unwrap();
    manager.transport().subscribe("stream-b", Vec::new()).await.unwrap();

    manager.logout().await.expect("logout should succeed");

    assert_eq!(manager.user_id(), None);
    assert!(manager.transport().active_subscriptions().is_empty());
    assert_eq!(manager.transport().unsubscribe_count(), 2);
    assert_eq!(manager.transport().logout_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_proceeds_when_unsubscribe_fails() {
    let manager = manager_with_credentials(MemoryTransport::new().with_user("bot", "pass", "u1"));
    manager.login(None).await.unwrap();
    manager.transport().subscribe("stream-a", Vec::new()).await.unwrap();
    manager.transport().set_fail_unsubscribe(true);

    manager.logout().await.expect("logout should still succeed");

    assert_eq!(manager.user_id(), None);
    assert_eq!(manager.transport().logout_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_logs_out_and_closes() {
    let manager = manager_with_credentials(MemoryTransport::new().with_user("bot", "pass", "u1"));
    manager.login(None).await.unwrap();
    let mut events = manager.subscribe_events();

    manager.disconnect().await.expect("disconnect should succeed");

    let session = manager.session();
    assert_eq!(session.state, SessionState::Disconnected);
    assert_eq!(session.user_id, None);
    assert!(!manager.transport().is_connected());
    assert_eq!(manager.transport().logout_count(), 1);
    assert_eq!(manager.transport().close_count(), 1);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::LoggedOut);
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_when_never_connected_is_harmless() {
    let manager = manager(MemoryTransport::new());

    manager.disconnect().await.expect("disconnect should succeed");

    assert_eq!(manager.session().state, SessionState::Disconnected);
    assert_eq!(manager.transport().logout_count(), 0);
}
