use axum::http::StatusCode;
use axum_test::TestServer;
use chat_relay_widget::AppState;
use chat_relay_widget::config::AppConfig;
use chat_relay_widget::server::{MessageDto, SendResponse, build_state, router};
use std::time::Duration;
use tokio::net::TcpListener;

fn config(extra: &[&str]) -> AppConfig {
    let mut args = vec!["chat-relay-widget", "--relay-base-url", "http://127.0.0.1:9"];
    args.extend_from_slice(extra);
    AppConfig::load_from_args(args).expect("config")
}

fn test_server() -> (TestServer, AppState) {
    let state = build_state(&config(&[])).expect("state");
    let server = TestServer::new(router(state.clone())).expect("test server");
    (server, state)
}

fn widget_id(html: &str) -> String {
    let marker = "data-widget-id=\"";
    let start = html.find(marker).expect("widget id in page") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

async fn open_page(server: &TestServer) -> String {
    let page = server.get("/").await;
    page.assert_status_ok();
    widget_id(&page.text())
}

#[tokio::test]
async fn test_page_load_creates_widget() {
    let (server, state) = test_server();

    let id = open_page(&server).await;
    assert_eq!(state.widgets.len(), 1);
    assert!(state.widgets.get(&id).is_some());

    // Every page load is its own widget.
    let other = open_page(&server).await;
    assert_ne!(id, other);
    assert_eq!(state.widgets.len(), 2);
}

#[tokio::test]
async fn test_load_event_renders_single_greeting() {
    let (server, _state) = test_server();
    let id = open_page(&server).await;

    let before: Vec<MessageDto> = server
        .get(&format!("/api/widgets/{id}/messages"))
        .await
        .json();
    assert!(before.is_empty());

    server
        .post(&format!("/api/widgets/{id}/load"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let messages: Vec<MessageDto> = server
        .get(&format!("/api/widgets/{id}/messages"))
        .await
        .json();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].side, "bot");
    assert_eq!(messages[0].text, "Hello there! Type in a message.");
}

#[tokio::test]
async fn test_send_renders_user_message_and_clears_input() {
    let (server, state) = test_server();
    let id = open_page(&server).await;

    let response = server
        .post(&format!("/api/widgets/{id}/send"))
        .form(&[("message", "Hello\nWorld")])
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let _: SendResponse = response.json();

    let messages: Vec<MessageDto> = server
        .get(&format!("/api/widgets/{id}/messages"))
        .await
        .json();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].side, "user");
    assert_eq!(messages[0].text, "Hello\nWorld");

    let widget = state.widgets.get(&id).unwrap();
    assert_eq!(widget.input(), "");
    assert!(widget.store().get(0).unwrap().html().contains("Hello<br>World"));
}

#[tokio::test]
async fn test_empty_send_still_renders() {
    let (server, _state) = test_server();
    let id = open_page(&server).await;

    server
        .post(&format!("/api/widgets/{id}/send"))
        .form(&[("message", "")])
        .await
        .assert_status(StatusCode::ACCEPTED);

    let messages: Vec<MessageDto> = server
        .get(&format!("/api/widgets/{id}/messages"))
        .await
        .json();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "");
}

#[tokio::test]
async fn test_cancel_pending_cycle() {
    let (server, state) = test_server();
    let id = open_page(&server).await;

    let sent: SendResponse = server
        .post(&format!("/api/widgets/{id}/send"))
        .form(&[("message", "cancel me")])
        .await
        .json();
    let cancel = format!("/api/widgets/{id}/cycles/{}/cancel", sent.correlation_id);

    server.post(&cancel).await.assert_status(StatusCode::NO_CONTENT);
    server.post(&cancel).await.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(state.widgets.get(&id).unwrap().pending_cycles(), 0);
}

#[tokio::test]
async fn test_unknown_widget_is_not_found() {
    let (server, _state) = test_server();

    server
        .post("/api/widgets/nope/load")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/api/widgets/nope/messages")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .post("/api/widgets/nope/send")
        .form(&[("message", "hi")])
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_widget() {
    let (server, state) = test_server();
    let id = open_page(&server).await;

    server
        .delete(&format!("/api/widgets/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(state.widgets.is_empty());
    server
        .delete(&format!("/api/widgets/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let (server, _state) = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

/// Full loop over real sockets: page, greeting, send, answer from the demo
/// query service mounted on the same server, and the SSE replay.
#[tokio::test]
async fn test_demo_backend_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let port_arg = port.to_string();

    let config = config(&["--port", &port_arg, "--demo-backend", "true"]);
    let state = build_state(&config).unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = format!("http://127.0.0.1:{port}");
    let http = reqwest::Client::new();

    let page = http.get(&base).send().await.unwrap().text().await.unwrap();
    let id = widget_id(&page);

    let load = http
        .post(format!("{base}/api/widgets/{id}/load"))
        .send()
        .await
        .unwrap();
    assert_eq!(load.status(), StatusCode::NO_CONTENT);

    let send = http
        .post(format!("{base}/api/widgets/{id}/send"))
        .form(&[("message", "Hello!")])
        .send()
        .await
        .unwrap();
    assert_eq!(send.status(), StatusCode::ACCEPTED);

    let messages_url = format!("{base}/api/widgets/{id}/messages");
    let messages = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let messages: Vec<MessageDto> = http
                .get(&messages_url)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if messages.len() == 3 {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("bot answer within 5s");

    let sides: Vec<&str> = messages.iter().map(|m| m.side.as_str()).collect();
    assert_eq!(sides, vec!["bot", "user", "bot"]);
    assert_eq!(messages[2].text, "Hello, welcome!");

    // A late subscriber gets the list replayed.
    let mut events = http
        .get(format!("{base}/api/widgets/{id}/events?after=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        events.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let replay = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = String::new();
        while buf.matches("event: entry.appended").count() < 2 {
            let chunk = events.chunk().await.unwrap().expect("stream open");
            buf.push_str(&String::from_utf8_lossy(&chunk));
        }
        buf
    })
    .await
    .expect("replayed entries");

    assert!(replay.contains(r#"class="message user"#));
    assert!(replay.contains("Hello, welcome!"));
    assert!(!replay.contains("Hello there! Type in a message."));
}
