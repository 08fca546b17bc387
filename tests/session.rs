mod common;

use common::{eventually, FakeAuth, Server, PILOTE2_KEY, TIMEOUT};
use heatzy_ws::{
    Action, ConnectOptions, HeatzyError, Mode, Notification, Session, SessionConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::accept_async;

fn session(server: &Server, devices: &[(&str, &str)]) -> Session {
    Session::new(Arc::new(FakeAuth::new(devices)), server.config())
}

#[tokio::test]
async fn connect_logs_in_and_keeps_alive() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[("A", PILOTE2_KEY)]);

    session.connect(ConnectOptions::default()).await.unwrap();
    assert!(session.is_connected());
    assert_eq!(session.devices().len(), 1);

    let login = server.recv_cmd("login_req").await;
    assert_eq!(
        login["data"],
        json!({
            "appid": "c70a66ff039d41b4a220e198b0fcc8b3",
            "uid": "user-1",
            "token": "secret",
            "p0_type": "attrs_v4",
            "heartbeat_interval": 1,
            "auto_subscribe": true
        })
    );
    assert!(!session.is_logged_in());

    server.push(json!({"cmd": "login_res", "data": {"success": true}}));
    eventually(|| session.is_logged_in()).await;

    server.recv_cmd("ping").await;
    server.recv_cmd("ping").await;
}

#[tokio::test]
async fn notifications_reach_the_callback() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[("A", PILOTE2_KEY)]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    session
        .connect(ConnectOptions::new().callback(move |n| {
            let _ = tx.send(n);
        }))
        .await
        .unwrap();
    server.recv_cmd("login_req").await;

    server.push(json!({"cmd": "s2c_noti", "data": {"did": "A", "attrs": {"mode": "eco", "lock_switch": 1}}}));

    let notification = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    match notification {
        Notification::Device(device) => {
            assert_eq!(device.did(), "A");
            assert_eq!(device.mode(), Some(Mode::Eco));
            assert!(device.is_locked());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.device("A").unwrap().mode(), Some(Mode::Eco));
}

#[tokio::test]
async fn rejected_login_ends_the_listener() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);

    session.connect(ConnectOptions::default()).await.unwrap();
    let listener = session.listener().unwrap();
    server.recv_cmd("login_req").await;

    server.push(json!({"cmd": "login_res", "data": {"success": false}}));

    let result = tokio::time::timeout(TIMEOUT, listener).await.unwrap();
    assert!(matches!(result, Err(HeatzyError::AuthenticationFailed(_))));
    assert!(!session.is_logged_in());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn server_close_is_a_websocket_error() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);

    session.connect(ConnectOptions::default()).await.unwrap();
    let listener = session.listener().unwrap();
    server.recv_cmd("login_req").await;

    server.push_close();

    let result = tokio::time::timeout(TIMEOUT, listener).await.unwrap();
    assert!(matches!(result, Err(HeatzyError::Websocket(_))));
    assert!(!session.is_connected());
    assert!(matches!(session.ping().await, Err(HeatzyError::Websocket(_))));
}

#[tokio::test]
async fn disconnect_ends_the_listener_cleanly() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);

    session.connect(ConnectOptions::default()).await.unwrap();
    let listener = session.listener().unwrap();
    server.recv_cmd("login_req").await;

    session.disconnect().await.unwrap();
    assert!(!session.is_connected());

    tokio::time::timeout(TIMEOUT, listener).await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_is_a_no_op_when_connected() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);

    session.connect(ConnectOptions::default()).await.unwrap();
    let listener = session.listener().unwrap();
    session.connect(ConnectOptions::default()).await.unwrap();

    assert!(session.listener().is_none());
    assert!(!listener.is_finished());
    server.recv_cmd("login_req").await;
}

#[tokio::test]
async fn all_devices_reads_every_device_at_connect() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[("A", PILOTE2_KEY), ("B", PILOTE2_KEY)]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    session
        .connect(ConnectOptions::new().all_devices(true).callback(move |n| {
            let _ = tx.send(n);
        }))
        .await
        .unwrap();

    server.recv_cmd("login_req").await;
    let mut read = vec![
        server.recv_cmd("c2s_read").await["data"]["did"].clone(),
        server.recv_cmd("c2s_read").await["data"]["did"].clone(),
    ];
    read.sort_by_key(|did| did.to_string());
    assert_eq!(read, vec![json!("A"), json!("B")]);

    server.push(json!({"cmd": "s2c_noti", "data": {"did": "A", "attrs": {"mode": "eco"}}}));
    server.push(json!({"cmd": "s2c_noti", "data": {"did": "B", "attrs": {"mode": "cft"}}}));

    let notification = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    match notification {
        Notification::All(devices) => {
            assert_eq!(devices.len(), 2);
            assert_eq!(devices["B"].mode(), Some(Mode::Comfort));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn manual_subscription_and_control() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[("A", PILOTE2_KEY)]);

    session
        .connect(ConnectOptions::new().auto_subscribe(false))
        .await
        .unwrap();
    let login = server.recv_cmd("login_req").await;
    assert_eq!(login["data"]["auto_subscribe"], json!(false));

    session.subscribe(["A"]).await.unwrap();
    assert_eq!(
        server.recv_cmd("subscribe_req").await,
        json!({"cmd": "subscribe_req", "data": [{"did": "A"}]})
    );

    server.push(json!({"cmd": "subscribe_res", "data": {"success": [{"did": "A"}], "failed": []}}));
    eventually(|| session.subscribed_devices() == vec!["A".to_string()]).await;

    session.send_action("A", Action::TurnOff).await.unwrap();
    assert_eq!(
        server.recv_cmd("c2s_write").await,
        json!({"cmd": "c2s_write", "data": {"did": "A", "attrs": {"mode": "stop"}}})
    );
}

#[tokio::test]
async fn signal_pulses_on_every_frame() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);
    let signal = Arc::new(Notify::new());

    session
        .connect(ConnectOptions::new().signal(signal.clone()))
        .await
        .unwrap();
    server.recv_cmd("login_req").await;

    server.push(json!({"cmd": "pong"}));
    tokio::time::timeout(TIMEOUT, signal.notified()).await.unwrap();

    server.push(json!("not an object"));
    tokio::time::timeout(TIMEOUT, signal.notified()).await.unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn invalid_message_is_recorded() {
    let mut server = Server::start().await;
    let mut session = session(&server, &[]);

    session.connect(ConnectOptions::default()).await.unwrap();
    server.recv_cmd("login_req").await;

    server.push(json!({"cmd": "s2c_invalid_msg", "data": {"error_code": 1009, "msg": "bad did"}}));
    eventually(|| session.last_invalid_msg().is_some()).await;
    assert_eq!(session.last_invalid_msg().unwrap()["error_code"], json!(1009));

    server.push(json!({"cmd": "login_res", "data": {"success": true}}));
    eventually(|| session.last_invalid_msg().is_none()).await;
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = SessionConfig::default()
        .with_host("127.0.0.1")
        .with_tls(false)
        .with_port(port);
    let mut session = Session::new(Arc::new(FakeAuth::new(&[])), config);

    match session.connect(ConnectOptions::default()).await {
        Err(HeatzyError::ConnectionFailed(msg)) => {
            assert!(msg.contains(&format!("ws://127.0.0.1:{port}/ws/app/v1")));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!session.is_connected());
}

#[tokio::test]
async fn token_failure_is_an_authentication_failure() {
    let server = Server::start().await;
    let mut session = Session::new(
        Arc::new(FakeAuth::new(&[]).failing_token()),
        server.config(),
    );

    let err = session.connect(ConnectOptions::default()).await.unwrap_err();
    assert!(matches!(err, HeatzyError::AuthenticationFailed(_)));

    // The aborted connection is torn down instead of left half-open
    assert!(!session.is_connected());
    let listener = session.listener().unwrap();
    tokio::time::timeout(TIMEOUT, listener).await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnect_gives_up_on_a_silent_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = accept_async(stream).await.unwrap();
        // Never read, never answer the close handshake
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let config = SessionConfig::default()
        .with_host("127.0.0.1")
        .with_tls(false)
        .with_port(port)
        .with_close_timeout(Duration::from_millis(200));
    let mut session = Session::new(Arc::new(FakeAuth::new(&[])), config);

    session.connect(ConnectOptions::default()).await.unwrap();
    let listener = session.listener().unwrap();

    session.disconnect().await.unwrap();
    tokio::time::timeout(TIMEOUT, listener).await.unwrap().unwrap();
}
