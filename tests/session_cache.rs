//! Session acquisition, caching, and invalidation against a stub portal.
//!
//! The stub speaks just enough HTTP/1.1 to serve the three-step login
//! handshake and records every request it sees, so the tests can assert
//! that a cache hit makes zero HTTP calls.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use registrar::portal::{PortalError, SessionManager, build_http_client};

/// One observed request: the request line plus the Cookie header, if any.
type RequestLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

struct StubPortal {
    addr: SocketAddr,
    requests: RequestLog,
    reject_logins: Arc<AtomicBool>,
}

impl StubPortal {
    fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn spawn_stub_portal() -> StubPortal {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let reject_logins = Arc::new(AtomicBool::new(false));

    let log = requests.clone();
    let reject = reject_logins.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let log = log.clone();
            let reject = reject.clone();
            tokio::spawn(async move {
                handle_connection(stream, log, reject).await;
            });
        }
    });

    StubPortal {
        addr,
        requests,
        reject_logins,
    }
}

async fn handle_connection(mut stream: TcpStream, log: RequestLog, reject: Arc<AtomicBool>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    // Read until the end of headers, then drain the body.
    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = header_value(&head, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() - header_end < content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or("").to_string();
    let cookie = header_value(&head, "cookie");
    log.lock().unwrap().push((request_line.clone(), cookie));

    let response = respond(&request_line, reject.load(Ordering::SeqCst));
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (header, value) = line.split_once(':')?;
        header
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

fn respond(request_line: &str, reject_logins: bool) -> String {
    let ok = |body: &str, set_cookie: Option<&str>| {
        let cookie_header = set_cookie
            .map(|c| format!("Set-Cookie: {c}\r\n"))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            body.len(),
            cookie_header,
            body
        )
    };

    if request_line.starts_with("GET /login.do") {
        let body = r#"<html><body><form method="post">
            <input type="hidden" name="token" value="stub-token" />
        </form></body></html>"#;
        ok(body, Some("JSESSIONID=stub-session; Path=/"))
    } else if request_line.starts_with("POST /login.do") {
        ok("<html><body></body></html>", Some("portal=authenticated"))
    } else if request_line.starts_with("GET /myInfo.do") {
        if reject_logins {
            "HTTP/1.1 302 Found\r\nLocation: /login.do\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string()
        } else {
            ok("<html><body>My Info</body></html>", None)
        }
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

fn manager(portal: &StubPortal, ttl: Duration) -> SessionManager {
    let http = build_http_client(Duration::from_secs(5)).unwrap();
    SessionManager::new(http, portal.base_url(), ttl)
}

#[tokio::test]
async fn test_cached_session_makes_no_http_calls() {
    let portal = spawn_stub_portal().await;
    let sessions = manager(&portal, Duration::from_secs(1800));

    let first = sessions.acquire("alice", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 3);
    assert!(first.cookie_header().contains("JSESSIONID=stub-session"));
    assert!(first.cookie_header().contains("portal=authenticated"));

    // Within the TTL the cache answers; the stub sees nothing.
    let second = sessions.acquire("alice", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 3);
    assert_eq!(second.cookie_header(), first.cookie_header());
}

#[tokio::test]
async fn test_invalidation_forces_full_handshake() {
    let portal = spawn_stub_portal().await;
    let sessions = manager(&portal, Duration::from_secs(1800));

    sessions.acquire("alice", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 3);

    sessions.invalidate("alice");
    sessions.acquire("alice", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 6);
}

#[tokio::test]
async fn test_expired_session_is_reacquired() {
    let portal = spawn_stub_portal().await;
    let sessions = manager(&portal, Duration::ZERO);

    sessions.acquire("alice", "pw").await.unwrap();
    sessions.acquire("alice", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 6);
}

#[tokio::test]
async fn test_principals_are_cached_independently() {
    let portal = spawn_stub_portal().await;
    let sessions = manager(&portal, Duration::from_secs(1800));

    sessions.acquire("alice", "pw").await.unwrap();
    sessions.acquire("bob", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 6);

    // Both stay cached.
    sessions.acquire("alice", "pw").await.unwrap();
    sessions.acquire("bob", "pw").await.unwrap();
    assert_eq!(portal.request_count(), 6);
}

#[tokio::test]
async fn test_rejected_credentials_fail_without_caching() {
    let portal = spawn_stub_portal().await;
    portal.reject_logins.store(true, Ordering::SeqCst);
    let sessions = manager(&portal, Duration::from_secs(1800));

    let err = sessions.acquire("mallory", "wrong").await.unwrap_err();
    assert!(matches!(err, PortalError::AuthenticationFailed(_)));

    // The failure was not cached; the next attempt hits the portal again.
    let count_after_first = portal.request_count();
    let _ = sessions.acquire("mallory", "wrong").await;
    assert!(portal.request_count() > count_after_first);
}

#[tokio::test]
async fn test_handshake_carries_cookies_forward() {
    let portal = spawn_stub_portal().await;
    let sessions = manager(&portal, Duration::from_secs(1800));

    sessions.acquire("alice", "pw").await.unwrap();

    let requests = portal.requests.lock().unwrap();
    // Step (b), the credentials POST, must carry the cookie from step (a).
    let (line, cookie) = &requests[1];
    assert!(line.starts_with("POST /login.do"));
    assert!(cookie.as_deref().unwrap_or("").contains("JSESSIONID=stub-session"));
    // Step (c), the verification GET, must carry the accumulated bundle.
    let (line, cookie) = &requests[2];
    assert!(line.starts_with("GET /myInfo.do"));
    let cookie = cookie.as_deref().unwrap_or("");
    assert!(cookie.contains("JSESSIONID=stub-session"));
    assert!(cookie.contains("portal=authenticated"));
}
