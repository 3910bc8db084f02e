//! Tests for upstream forwarding

use devgate::http::request::{Method, RequestBuilder};
use devgate::http::response::StatusCode;
use devgate::proxy::upstream::ProxyHandler;
use devgate::routing::{ForwardingRule, PathRewrite, ResolvedRoute, RuleTable};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn handler() -> ProxyHandler {
    ProxyHandler::new(Duration::from_secs(5), Duration::from_secs(30))
}

fn route_for(rule: ForwardingRule, path: &str) -> ResolvedRoute {
    let table = RuleTable::new(vec![rule]).unwrap();
    table.resolve(path).unwrap().route().cloned().unwrap()
}

/// Accepts one connection, hands the raw request back and replies with `reply`.
async fn fake_upstream(reply: &'static [u8]) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&received[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if received.len() >= end + 4 + length {
                    break;
                }
            }
        }

        let _ = tx.send(String::from_utf8_lossy(&received).into_owned());
        socket.write_all(reply).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (origin, rx)
}

#[test]
fn test_build_upstream_request_change_origin() {
    let route = route_for(
        ForwardingRule::new("/api", "http://localhost:5001"),
        "/api/users",
    );
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api/users?page=2")
        .header("Host", "localhost:8080")
        .header("User-Agent", "Test")
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let bytes = handler().build_upstream_request(&request, &route, &target);
    let text = String::from_utf8_lossy(&bytes);

    assert!(text.starts_with("GET /api/users?page=2 HTTP/1.1\r\n"));
    assert!(text.contains("Host: localhost:5001\r\n"));
    assert!(!text.contains("Host: localhost:8080"));
    assert!(text.contains("User-Agent: Test\r\n"));
    assert!(text.contains("Connection: close\r\n"));
}

#[test]
fn test_build_upstream_request_keeps_client_host() {
    let route = route_for(
        ForwardingRule::new("/api", "http://localhost:5001").with_change_origin(false),
        "/api/users",
    );
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api/users")
        .header("host", "devbox:8080")
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(text.contains("Host: devbox:8080\r\n"));
    assert_eq!(text.matches("ost: ").count(), 1);
}

#[test]
fn test_build_upstream_request_uses_rewritten_path() {
    let route = route_for(
        ForwardingRule::new("/api", "http://localhost:5001")
            .with_rewrite(PathRewrite::new("^/api", "").unwrap()),
        "/api/reviews",
    );
    let request = RequestBuilder::new()
        .method(Method::DELETE)
        .target("/api/reviews")
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(text.starts_with("DELETE /reviews HTTP/1.1\r\n"));
}

#[test]
fn test_build_upstream_request_empty_rewrite_becomes_root() {
    let route = route_for(
        ForwardingRule::new("/api", "http://localhost:5001")
            .with_rewrite(PathRewrite::new("^/api", "").unwrap()),
        "/api",
    );
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api")
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(text.starts_with("GET / HTTP/1.1\r\n"));
}

#[test]
fn test_build_upstream_request_removes_hop_by_hop_headers() {
    let route = route_for(ForwardingRule::new("/", "http://localhost:3000"), "/");
    let request = RequestBuilder::new()
        .method(Method::POST)
        .target("/")
        .header("Connection", "keep-alive")
        .header("Upgrade", "websocket")
        .header("Keep-Alive", "timeout=5")
        .header("Content-Length", "4")
        .header("Content-Type", "application/json")
        .body(b"{\"\"}".to_vec())
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(text.contains("Connection: close\r\n"));
    assert!(!text.contains("keep-alive"));
    assert!(!text.contains("Upgrade"));
    assert!(!text.contains("Keep-Alive"));
    assert!(text.contains("Content-Type: application/json\r\n"));
    assert_eq!(text.matches("Content-Length").count(), 1);
    assert!(text.ends_with("\r\n\r\n{\"\"}"));
}

#[test]
fn test_build_upstream_request_keeps_repeated_headers() {
    let route = route_for(ForwardingRule::new("/api", "http://localhost:5001"), "/api/x");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api/x")
        .header("X-Forwarded-For", "10.0.0.1")
        .header("Accept", "*/*")
        .header("X-Forwarded-For", "10.0.0.2")
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    let first = text.find("X-Forwarded-For: 10.0.0.1\r\n").unwrap();
    let second = text.find("X-Forwarded-For: 10.0.0.2\r\n").unwrap();
    assert!(first < second);
}

#[test]
fn test_build_upstream_request_drops_expect_continue() {
    let route = route_for(ForwardingRule::new("/api", "http://localhost:5001"), "/api/upload");
    let request = RequestBuilder::new()
        .method(Method::PUT)
        .target("/api/upload")
        .header("Expect", "100-continue")
        .header("Content-Length", "2")
        .body(b"ok".to_vec())
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(!text.contains("Expect"));
    assert!(text.contains("Content-Length: 2\r\n"));
    assert!(text.ends_with("\r\n\r\nok"));
}

#[test]
fn test_build_upstream_request_reframes_chunked_body() {
    let route = route_for(ForwardingRule::new("/api", "http://localhost:5001"), "/api/x");
    // body as the parser leaves it after dechunking
    let request = RequestBuilder::new()
        .method(Method::POST)
        .target("/api/x")
        .header("Transfer-Encoding", "chunked")
        .body(b"hello".to_vec())
        .build()
        .unwrap();

    let target = url::Url::parse(route.target_origin()).unwrap();
    let text = String::from_utf8(handler().build_upstream_request(&request, &route, &target)).unwrap();

    assert!(!text.contains("Transfer-Encoding"));
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_forward_relays_upstream_response() {
    let (origin, received) = fake_upstream(
        b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 11\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n{\"id\": 42}\n",
    )
    .await;

    let route = route_for(ForwardingRule::new("/api", &origin), "/api/users");
    let request = RequestBuilder::new()
        .method(Method::POST)
        .target("/api/users")
        .header("Host", "localhost:8080")
        .header("Content-Length", "5")
        .body(b"hello".to_vec())
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.body, b"{\"id\": 42}\n".to_vec());
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    assert_eq!(
        response.headers.iter().filter(|(k, _)| k == "Set-Cookie").count(),
        2
    );

    let raw = received.await.unwrap();
    let authority = origin.trim_start_matches("http://");
    assert!(raw.starts_with("POST /api/users HTTP/1.1\r\n"));
    assert!(raw.contains(&format!("Host: {}\r\n", authority)));
    assert!(raw.ends_with("hello"));
}

#[tokio::test]
async fn test_forward_skips_interim_continue_response() {
    let (origin, _received) = fake_upstream(
        b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok",
    )
    .await;

    let route = route_for(ForwardingRule::new("/api", &origin), "/api/upload");
    let request = RequestBuilder::new()
        .method(Method::POST)
        .target("/api/upload")
        .header("Expect", "100-continue")
        .header("Content-Length", "4")
        .body(b"data".to_vec())
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.body, b"ok".to_vec());
}

#[tokio::test]
async fn test_forward_skips_several_interim_responses() {
    let (origin, _received) = fake_upstream(
        b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </app.css>; rel=preload\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone",
    )
    .await;

    let route = route_for(ForwardingRule::new("/api", &origin), "/api/x");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api/x")
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"done".to_vec());
    assert_eq!(response.header("Link"), None);
}

#[tokio::test]
async fn test_forward_decodes_chunked_response() {
    let (origin, _received) = fake_upstream(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
    )
    .await;

    let route = route_for(ForwardingRule::new("/static", &origin), "/static/a.txt");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/static/a.txt")
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.body, b"hello world".to_vec());
    assert_eq!(response.header("Transfer-Encoding"), None);
    assert_eq!(response.header("Content-Length"), Some("11"));
}

#[tokio::test]
async fn test_forward_reads_body_until_close() {
    let (origin, _received) =
        fake_upstream(b"HTTP/1.1 200 OK\r\nContent-Type: text/css\r\n\r\nbody{margin:0}").await;

    let route = route_for(ForwardingRule::new("/css", &origin), "/css/app.css");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/css/app.css")
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.body, b"body{margin:0}".to_vec());
    assert_eq!(response.header("Content-Length"), Some("14"));
}

#[tokio::test]
async fn test_forward_head_request_has_no_body() {
    let (origin, _received) =
        fake_upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n").await;

    let route = route_for(ForwardingRule::new("/js", &origin), "/js/app.js");
    let request = RequestBuilder::new()
        .method(Method::HEAD)
        .target("/js/app.js")
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;

    assert_eq!(response.status, StatusCode::Ok);
    assert!(response.body.is_empty());
    assert_eq!(response.header("Content-Length"), Some("1234"));
}

#[tokio::test]
async fn test_forward_connection_refused_is_bad_gateway() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let route = route_for(ForwardingRule::new("/api", &origin), "/api");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api")
        .build()
        .unwrap();

    let response = handler().forward(&request, &route).await;
    assert_eq!(response.status, StatusCode::BadGateway);
}

#[tokio::test]
async fn test_forward_slow_upstream_is_gateway_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let proxy = ProxyHandler::new(Duration::from_secs(1), Duration::from_millis(100));
    let route = route_for(ForwardingRule::new("/api", &origin), "/api");
    let request = RequestBuilder::new()
        .method(Method::GET)
        .target("/api")
        .build()
        .unwrap();

    let response = proxy.forward(&request, &route).await;
    assert_eq!(response.status, StatusCode::GatewayTimeout);
}
