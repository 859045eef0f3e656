//! HTTP API over a real socket.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use leadbook::api::ApiServer;
use leadbook::notify::Notifier;
use serde_json::{json, Value};

/// Caller headers: user id, role and optional preparer id.
type Identity<'a> = Option<(&'a str, &'a str, Option<&'a str>)>;

struct TestServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("api.db");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        let handle = std::thread::spawn(move || {
            // The notifier is single-threaded, so the server lives on this thread
            let server = ApiServer::new("127.0.0.1", addr.port(), db_path, Notifier::disabled()).unwrap();
            server.serve(listener, flag).unwrap();
        });

        Self {
            addr,
            shutdown,
            handle: Some(handle),
            _dir: dir,
        }
    }

    fn request(&self, method: &str, path: &str, identity: Identity<'_>, body: Option<Value>) -> (u16, Value) {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        self.raw(method, path, identity, &body)
    }

    fn raw(&self, method: &str, path: &str, identity: Identity<'_>, body: &str) -> (u16, Value) {
        let mut request = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
        if let Some((user, role, preparer)) = identity {
            request.push_str(&format!("X-User-Id: {}\r\nX-User-Role: {}\r\n", user, role));
            if let Some(p) = preparer {
                request.push_str(&format!("X-Preparer-Id: {}\r\n", p));
            }
        }
        request.push_str(&format!("Content-Length: {}\r\n\r\n{}", body.len(), body));

        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let status: u16 = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let (_, payload) = response.split_once("\r\n\r\n").unwrap();
        (status, serde_json::from_str(payload).unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

const ADMIN: Identity<'static> = Some(("admin-1", "ADMIN", None));

fn create(server: &TestServer, email: &str) -> String {
    let (status, body) = server.request(
        "POST",
        "/contacts",
        ADMIN,
        Some(json!({ "first_name": "Ann", "last_name": "Lee", "email": email })),
    );
    assert_eq!(status, 201, "{}", body);
    body["data"]["contact"]["id"].as_str().unwrap().to_string()
}

#[test]
fn health_needs_no_identity() {
    let server = TestServer::start();
    let (status, body) = server.request("GET", "/health", None, None);
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[test]
fn missing_identity_is_unauthorized() {
    let server = TestServer::start();
    let (status, body) = server.request("GET", "/contacts", None, None);
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    let (status, _) = server.request("GET", "/contacts", Some(("u1", "JANITOR", None)), None);
    assert_eq!(status, 401);
}

#[test]
fn preparer_without_preparer_id_is_a_server_error() {
    let server = TestServer::start();
    let (status, body) = server.request("GET", "/contacts", Some(("u1", "TAX_PREPARER", None)), None);
    assert_eq!(status, 500);
    assert_eq!(body["error"], "Internal server error");
}

#[test]
fn contact_lifecycle_over_http() {
    let server = TestServer::start();
    let id = create(&server, "ann@x.com");

    let (status, body) = server.request(
        "POST",
        "/contacts",
        ADMIN,
        Some(json!({ "first_name": "Ann", "last_name": "Lee", "email": "ANN@x.com" })),
    );
    assert_eq!(status, 400);
    assert_eq!(body["fields"][0]["field"], "email");

    let (status, body) = server.request(
        "POST",
        "/contacts",
        ADMIN,
        Some(json!({ "first_name": "Annie", "last_name": "Lee", "email": "ann@x.com", "upsert": true })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["created"], false);
    assert_eq!(body["data"]["contact"]["id"], id.as_str());

    let (status, body) = server.request(
        "POST",
        &format!("/contacts/{}/stage", id),
        ADMIN,
        Some(json!({ "stage": "CONTACTED", "reason": "first call" })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"]["stage"], "CONTACTED");

    let (status, body) = server.request("GET", &format!("/contacts/{}/stage-history", id), ADMIN, None);
    assert_eq!(status, 200);
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["from_stage"], "NEW");
    assert_eq!(history[0]["to_stage"], "CONTACTED");

    let (status, _) = server.request(
        "POST",
        &format!("/contacts/{}/interactions", id),
        ADMIN,
        Some(json!({ "type": "CALL", "direction": "INBOUND", "body": "Asked about deadlines" })),
    );
    assert_eq!(status, 201);

    let (status, body) = server.request("GET", &format!("/contacts/{}", id), ADMIN, None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["contact"]["first_name"], "Annie");
    assert_eq!(body["data"]["counts"]["interactions"], 1);
    assert!(body["data"]["contact"]["last_contacted_at"].is_string());

    let (status, body) = server.request("GET", "/contacts?stage=contacted&search=annie", ADMIN, None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);

    let (status, _) = server.request("DELETE", &format!("/contacts/{}", id), ADMIN, None);
    assert_eq!(status, 200);
    let (status, _) = server.request("GET", &format!("/contacts/{}", id), ADMIN, None);
    assert_eq!(status, 404);
}

#[test]
fn preparer_is_scoped_by_assignment() {
    let server = TestServer::start();
    let mine = create(&server, "mine@x.com");
    let theirs = create(&server, "theirs@x.com");

    for (id, preparer) in [(&mine, "p1"), (&theirs, "p2")] {
        let (status, _) = server.request(
            "POST",
            &format!("/contacts/{}/assign", id),
            ADMIN,
            Some(json!({ "preparer_id": preparer })),
        );
        assert_eq!(status, 200);
    }

    let p1 = Some(("user-p1", "TAX_PREPARER", Some("p1")));
    let (status, body) = server.request("GET", "/contacts?assigned=p2", p1, None);
    assert_eq!(status, 200);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["contacts"][0]["id"], mine.as_str());

    let (status, body) = server.request("GET", &format!("/contacts/{}", theirs), p1, None);
    assert_eq!(status, 403);
    assert_eq!(body["error"], "Access denied");

    let (status, _) = server.request("DELETE", &format!("/contacts/{}", mine), p1, None);
    assert_eq!(status, 403);
}

#[test]
fn tags_and_tasks() {
    let server = TestServer::start();
    let id = create(&server, "t@x.com");

    let (status, body) = server.request(
        "POST",
        &format!("/contacts/{}/tags", id),
        ADMIN,
        Some(json!({ "name": "High Value" })),
    );
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = server.request("DELETE", &format!("/contacts/{}/tags/High%20Value", id), ADMIN, None);
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = server.request(
        "POST",
        &format!("/contacts/{}/tags", id),
        ADMIN,
        Some(json!({ "name": "c++" })),
    );
    assert_eq!(status, 200);
    let (status, body) = server.request("DELETE", &format!("/contacts/{}/tags/c++", id), ADMIN, None);
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = server.request(
        "POST",
        &format!("/contacts/{}/tasks", id),
        ADMIN,
        Some(json!({ "title": "Request W-2" })),
    );
    assert_eq!(status, 201);
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = server.request("POST", &format!("/tasks/{}/complete", task_id), ADMIN, None);
    assert_eq!(status, 200);
    assert!(body["data"]["completed_at"].is_string());

    let (_, body) = server.request("GET", &format!("/contacts/{}/tasks", id), ADMIN, None);
    assert!(body["data"].as_array().unwrap().is_empty());
    let (_, body) = server.request("GET", &format!("/contacts/{}/tasks?all=true", id), ADMIN, None);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[test]
fn bad_requests() {
    let server = TestServer::start();

    let (status, body) = server.raw("POST", "/contacts", ADMIN, "{not json");
    assert_eq!(status, 400);
    assert_eq!(body["fields"][0]["field"], "body");

    let (status, body) = server.request("GET", "/contacts?stage=ARCHIVED&limit=-1", ADMIN, None);
    assert_eq!(status, 400);
    assert_eq!(body["fields"].as_array().unwrap().len(), 2);

    let (status, _) = server.request("GET", "/contacts/not-a-uuid", ADMIN, None);
    assert_eq!(status, 404);

    let (status, _) = server.request("GET", "/reports", ADMIN, None);
    assert_eq!(status, 404);
}
