//! End-to-end tests: a real server on an ephemeral port, driven over TCP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use solo::page::IndexPage;
use solo::router::Pattern;
use solo::{Router, Server, ServerConfig, ServerError, ServerHandle};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> ServerConfig {
    ServerConfig {
        read_timeout: Some(IO_TIMEOUT),
        shutdown_grace: IO_TIMEOUT,
        ..ServerConfig::with_port(0)
    }
}

async fn start(router: Router) -> ServerHandle {
    start_with(config(), router).await
}

async fn start_with(config: ServerConfig, router: Router) -> ServerHandle {
    Server::new(config, router).start().await.unwrap()
}

async fn connect(handle: &ServerHandle) -> TcpStream {
    TcpStream::connect(("127.0.0.1", handle.port())).await.unwrap()
}

async fn read_reply(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut raw))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(raw).unwrap()
}

async fn exchange(handle: &ServerHandle, request: &[u8]) -> String {
    let mut stream = connect(handle).await;
    stream.write_all(request).await.unwrap();
    read_reply(&mut stream).await
}

#[derive(Debug)]
struct Reply {
    status_line: String,
    headers: Vec<String>,
    body: String,
}

impl Reply {
    fn parse(raw: &str) -> Self {
        let (head, body) = raw.split_once("\r\n\r\n").expect("no blank line in reply");
        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap().to_owned();
        let mut headers: Vec<String> = lines.map(str::to_owned).collect();
        headers.sort();
        Self {
            status_line,
            headers,
            body: body.to_owned(),
        }
    }

    fn has_header(&self, line: &str) -> bool {
        self.headers.iter().any(|h| h == line)
    }
}

const GET_ROOT: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

fn index_router(page: Arc<IndexPage>) -> Router {
    let mut router = Router::new();
    router.get("/", move |_ctx, res| {
        res.body(page.render());
    });
    router
}

#[tokio::test]
async fn serves_templated_index_and_counts_hits() {
    let page = Arc::new(IndexPage::from_template("<html><body>{}</body></html>"));
    let handle = start(index_router(Arc::clone(&page))).await;

    let first = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(first.status_line, "HTTP/1.1 200 OK");
    assert_eq!(first.body, "<html><body>0</body></html>");
    assert_eq!(
        first.headers,
        vec![
            "Connection: Keep-Alive".to_owned(),
            format!("Content-Length: {}", first.body.len()),
            "Content-Type: text/html".to_owned(),
        ]
    );

    let second = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(second.body, "<html><body>1</body></html>");
    assert_eq!(page.hits(), 2);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn request_split_across_many_writes() {
    let page = Arc::new(IndexPage::from_template("{}"));
    let handle = start(index_router(page)).await;

    let mut stream = connect(&handle).await;
    for piece in GET_ROOT.chunks(3) {
        stream.write_all(piece).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let reply = Reply::parse(&read_reply(&mut stream).await);
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.body, "0");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn unmatched_route_gets_404() {
    let handle = start(Router::new()).await;

    let reply = Reply::parse(&exchange(&handle, b"GET /missing HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.status_line, "HTTP/1.1 404 Not Found");
    assert!(reply.body.is_empty());
    assert!(!reply.headers.iter().any(|h| h.starts_with("Content-Length")));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_request_gets_400_and_server_survives() {
    let handle = start(index_router(Arc::new(IndexPage::from_template("ok")))).await;

    let reply = Reply::parse(&exchange(&handle, b"GET / HTTP/1.1\rX-Broken\r\n\r\n").await);
    assert_eq!(reply.status_line, "HTTP/1.1 400 Bad Request");

    let reply = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn peer_hanging_up_early_is_never_dispatched() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    let seen = Arc::clone(&calls);
    router.get("/", move |_, res| {
        seen.fetch_add(1, Ordering::SeqCst);
        res.body("hi");
    });
    let handle = start(router).await;

    let mut stream = connect(&handle).await;
    // No blank line: the request never completes.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    assert_eq!(read_reply(&mut stream).await, "");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let reply = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(reply.body, "hi");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn second_connection_waits_for_the_first() {
    let page = Arc::new(IndexPage::from_template("{}"));
    let handle = start(index_router(page)).await;

    let mut first = connect(&handle).await;
    first.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = connect(&handle).await;
    second.write_all(GET_ROOT).await.unwrap();

    let mut byte = [0u8; 1];
    let early = tokio::time::timeout(Duration::from_millis(300), second.read(&mut byte)).await;
    assert!(early.is_err(), "second peer was served while the first was open");

    first.write_all(b"Host: localhost\r\n\r\n").await.unwrap();
    let first_reply = Reply::parse(&read_reply(&mut first).await);
    assert_eq!(first_reply.body, "0");

    let second_reply = Reply::parse(&read_reply(&mut second).await);
    assert_eq!(second_reply.body, "1");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn every_overlapping_handler_contributes() {
    let mut router = Router::new();
    router.get(Pattern::regex(r"/api/.*").unwrap(), |_, res| {
        res.header("X-Api", "yes");
    });
    router.get(Pattern::regex(r"/api/users/(?P<id>\d+)").unwrap(), |ctx, res| {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        res.body(format!("user {id}"));
    });
    router.get("/api/users/7", |_, res| {
        res.header("X-Exact", "yes");
    });
    let handle = start(router).await;

    let reply = Reply::parse(&exchange(&handle, b"GET /api/users/7 HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert_eq!(reply.body, "user 7");
    assert!(reply.has_header("X-Api: yes"));
    assert!(reply.has_header("X-Exact: yes"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn non_ascii_path_and_header_round_trip() {
    let mut router = Router::new();
    router.get("/café", |ctx, res| {
        let name = ctx.request().header("x-name").unwrap_or_default().to_owned();
        res.header("X-Name", name.clone()).body(format!("bonjour {name}"));
    });
    let handle = start(router).await;

    let request = "GET /café HTTP/1.1\r\nX-Name: Zoë\r\n\r\n";
    let reply = Reply::parse(&exchange(&handle, request.as_bytes()).await);
    assert_eq!(reply.status_line, "HTTP/1.1 200 OK");
    assert!(reply.has_header("X-Name: Zoë"));
    assert_eq!(reply.body, "bonjour Zoë");
    assert!(reply.has_header(&format!("Content-Length: {}", "bonjour Zoë".len())));

    let reply = Reply::parse(&exchange(&handle, b"GET /caf\xe9 HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.status_line, "/ 400 Bad Request");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn panicking_handler_gets_500_and_server_survives() {
    let mut router = Router::new();
    router.get("/boom", |_, _| panic!("handler exploded"));
    router.get("/", |_, res| {
        res.body("alive");
    });
    let handle = start(router).await;

    let reply = Reply::parse(&exchange(&handle, b"GET /boom HTTP/1.1\r\n\r\n").await);
    assert_eq!(reply.status_line, "HTTP/1.1 500 Internal Server Error");

    let reply = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(reply.body, "alive");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn body_is_read_up_to_content_length() {
    let mut router = Router::new();
    router.post("/echo", |ctx, res| {
        res.body(ctx.request().body().to_vec());
    });
    let handle = start(router).await;

    let mut stream = connect(&handle).await;
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream.write_all(b"world").await.unwrap();

    let reply = Reply::parse(&read_reply(&mut stream).await);
    assert_eq!(reply.body, "helloworld");
    assert!(reply.has_header("Content-Length: 10"));

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_request_gets_413() {
    let config = ServerConfig {
        max_request_bytes: 64,
        ..config()
    };
    let handle = start_with(config, Router::new()).await;

    let path = "a".repeat(100);
    let request = format!("GET /{path} HTTP/1.1\r\n\r\n");
    let reply = Reply::parse(&exchange(&handle, request.as_bytes()).await);
    assert!(
        reply.status_line.ends_with(" 413 Payload Too Large"),
        "got {:?}",
        reply.status_line
    );

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn silent_peer_is_dropped_after_read_timeout() {
    let config = ServerConfig {
        read_timeout: Some(Duration::from_millis(200)),
        ..config()
    };
    let page = Arc::new(IndexPage::from_template("{}"));
    let handle = start_with(config, index_router(page)).await;

    let mut silent = connect(&handle).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = Reply::parse(&exchange(&handle, GET_ROOT).await);
    assert_eq!(reply.body, "0");
    assert_eq!(read_reply(&mut silent).await, "");

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_the_listener() {
    let handle = start(Router::new()).await;
    let port = handle.port();

    handle.stop().await.unwrap();
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn stop_is_bounded_by_grace_period() {
    let config = ServerConfig {
        read_timeout: None,
        ..config()
    };
    let handle = start_with(config, Router::new()).await;

    // A peer that connects and never sends holds the worker.
    let _stalled = connect(&handle).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = handle.stop_within(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(ServerError::ShutdownTimeout(_))));
}

#[tokio::test]
async fn port_in_use_fails_to_start() {
    let first = start(Router::new()).await;
    let taken = ServerConfig::with_port(first.port());

    let result = Server::new(taken, Router::new()).start().await;
    assert!(matches!(result, Err(ServerError::Connection(_))));

    first.stop().await.unwrap();
}
