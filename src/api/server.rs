//! HTTP server exposing the CRM operations as a JSON API.
//!
//! Requests are handled one at a time on the accepting thread, each with its own database
//! connection. Identity comes from headers set by the upstream auth proxy.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::types::*;
use crate::crm::{AccessContext, ContactService, UserRole};
use crate::db::{Database, SCHEMA_VERSION};
use crate::error::{CrmError, FieldError};
use crate::models::{
    ContactFilters, ContactPatch, ContactType, NewTask, Pagination, Stage, StageUpdate, DEFAULT_PAGE_SIZE,
};
use crate::notify::Notifier;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_ROLE: &str = "x-user-role";
pub const HEADER_PREPARER_ID: &str = "x-preparer-id";

/// A parsed HTTP request.
#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Failure while handling a request, before it becomes a status code.
#[derive(Debug)]
enum ApiError {
    Crm(CrmError),
    Unauthenticated(String),
    PayloadTooLarge,
    RouteNotFound,
}

impl From<CrmError> for ApiError {
    fn from(e: CrmError) -> Self {
        Self::Crm(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Crm(CrmError::Serialization(e))
    }
}

type Reply = (u16, serde_json::Value);
type HandlerResult = std::result::Result<Reply, ApiError>;

fn ok<T: Serialize>(status: u16, data: T) -> HandlerResult {
    Ok((status, serde_json::to_value(ApiResponse::ok(data))?))
}

pub struct ApiServer {
    host: String,
    port: u16,
    db_path: PathBuf,
    notifier: Notifier,
    start_time: Instant,
}

impl ApiServer {
    /// Create a server. Opens the database once so migration problems surface at startup.
    pub fn new(host: impl Into<String>, port: u16, db_path: PathBuf, notifier: Notifier) -> Result<Self> {
        Database::open_at(&db_path)?;

        Ok(Self {
            host: host.into(),
            port,
            db_path,
            notifier,
            start_time: Instant::now(),
        })
    }

    /// Bind the configured address and serve until `shutdown` is set (blocking).
    pub fn start(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))?;
        self.serve(listener, shutdown)
    }

    /// Serve on an already bound listener until `shutdown` is set.
    pub fn serve(&self, listener: TcpListener, shutdown: Arc<AtomicBool>) -> Result<()> {
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "API server listening");

        while !shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = self.handle_connection(stream, peer_addr) {
                        tracing::warn!(peer = %peer_addr, error = %e, "request error");
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept error");
                }
            }
        }

        tracing::info!("API server stopped");
        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let started = Instant::now();
        let mut reader = BufReader::new(stream.try_clone()?);

        let (status, body) = match read_request(&mut reader) {
            Ok(Some(request)) => {
                let (status, body) = self.dispatch(&request);
                tracing::info!(
                    peer = %peer_addr,
                    method = %request.method,
                    path = %request.path,
                    status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request"
                );
                (status, body)
            }
            Ok(None) => return Ok(()),
            Err(e) => error_reply(e),
        };

        send_json_response(&mut stream, status, &body)
    }

    fn dispatch(&self, request: &Request) -> Reply {
        match self.route(request) {
            Ok(reply) => reply,
            Err(e) => error_reply(e),
        }
    }

    fn route(&self, req: &Request) -> HandlerResult {
        let segments: Vec<&str> = req.path.split('/').filter(|s| !s.is_empty()).collect();

        if let ("GET", ["health"]) = (req.method.as_str(), segments.as_slice()) {
            return self.handle_health();
        }

        let ctx = identity(&req.headers)?;
        let db = Database::open_at(&self.db_path)?;
        let svc = ContactService::new(&db, &self.notifier);

        match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["contacts"]) => {
                let (filters, pagination) = list_params(&req.query)?;
                ok(200, svc.list_contacts(filters, pagination, &ctx)?)
            }
            ("POST", ["contacts"]) => {
                let body: CreateContactRequest = parse_body(&req.body)?;
                let outcome = svc.create_contact(body.contact, body.upsert, &ctx)?;
                let status = if outcome.was_created() { 201 } else { 200 };
                ok(
                    status,
                    CreateContactResponse {
                        created: outcome.was_created(),
                        contact: outcome.into_contact(),
                    },
                )
            }
            ("GET", ["contacts", id]) => ok(200, svc.get_contact_by_id(contact_id(id)?, &ctx)?),
            ("PATCH", ["contacts", id]) => {
                let patch: ContactPatch = parse_body(&req.body)?;
                ok(200, svc.update_contact(contact_id(id)?, patch, &ctx)?)
            }
            ("DELETE", ["contacts", id]) => {
                svc.delete_contact(contact_id(id)?, &ctx)?;
                ok(200, serde_json::json!({ "deleted": true }))
            }
            ("POST", ["contacts", id, "assign"]) => {
                let body: AssignRequest = parse_body(&req.body)?;
                ok(200, svc.assign_contact_to_preparer(contact_id(id)?, &body.preparer_id, &ctx)?)
            }
            ("POST", ["contacts", id, "stage"]) => {
                let body: StageRequest = parse_body(&req.body)?;
                let stage: Stage = body
                    .stage
                    .parse()
                    .map_err(|e: String| CrmError::invalid("stage", e))?;
                let update = StageUpdate {
                    contact_id: contact_id(id)?,
                    stage,
                    reason: body.reason,
                };
                ok(200, svc.update_contact_stage(update, &ctx)?)
            }
            ("GET", ["contacts", id, "stage-history"]) => {
                let limit = query_u32(&req.query, "limit")?;
                ok(200, svc.get_contact_stage_history(contact_id(id)?, &ctx, limit)?)
            }
            ("POST", ["contacts", id, "commission"]) => {
                let body: CommissionRequest = parse_body(&req.body)?;
                ok(200, svc.lock_commission_rate(contact_id(id)?, body.rate, &ctx)?)
            }
            ("POST", ["contacts", id, "interactions"]) => {
                let body: LogInteractionRequest = parse_body(&req.body)?;
                let input = body.into_input(contact_id(id)?);
                ok(201, svc.log_interaction(input, &ctx)?)
            }
            ("GET", ["contacts", id, "interactions"]) => {
                let limit = query_u32(&req.query, "limit")?;
                ok(200, svc.get_contact_interactions(contact_id(id)?, &ctx, limit)?)
            }
            ("POST", ["contacts", id, "tags"]) => {
                let body: TagRequest = parse_body(&req.body)?;
                ok(200, svc.tag_contact(contact_id(id)?, &body.name, &ctx)?)
            }
            ("DELETE", ["contacts", id, "tags", name]) => {
                ok(200, svc.untag_contact(contact_id(id)?, &decode_segment(name), &ctx)?)
            }
            ("POST", ["contacts", id, "tasks"]) => {
                let body: NewTask = parse_body(&req.body)?;
                ok(201, svc.create_task(contact_id(id)?, body, &ctx)?)
            }
            ("GET", ["contacts", id, "tasks"]) => {
                let include_completed = req.query.get("all").is_some_and(|v| v == "true" || v == "1");
                ok(200, svc.list_contact_tasks(contact_id(id)?, &ctx, include_completed)?)
            }
            ("POST", ["tasks", id, "complete"]) => {
                let task_id = Uuid::parse_str(id).map_err(|_| CrmError::not_found("Task", id))?;
                ok(200, svc.complete_task(task_id, &ctx)?)
            }
            _ => Err(ApiError::RouteNotFound),
        }
    }

    fn handle_health(&self) -> HandlerResult {
        Database::open_at(&self.db_path)?;
        ok(
            200,
            HealthResponse {
                status: "ok".to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                schema_version: SCHEMA_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )
    }
}

/// Read one request from the stream. `Ok(None)` means the peer closed without sending one.
fn read_request(reader: &mut impl BufRead) -> std::result::Result<Option<Request>, ApiError> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).map_err(io_error)? == 0 {
        return Ok(None);
    }

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ApiError::Crm(CrmError::invalid("request", "malformed request line")));
    }

    let method = parts[0].to_uppercase();
    let (path, query) = match parts[1].split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query(q)),
        None => (parts[1].to_string(), HashMap::new()),
    };

    let mut headers = HashMap::new();
    let mut content_length = 0usize;
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).map_err(io_error)? == 0 {
            break;
        }
        let header_line = header_line.trim();
        if header_line.is_empty() {
            break;
        }
        if let Some((key, value)) = header_line.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();
            if key == "content-length" {
                content_length = value.parse().unwrap_or(0);
            }
            headers.insert(key, value);
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).map_err(io_error)?;
    }

    Ok(Some(Request {
        method,
        path,
        query,
        headers,
        body,
    }))
}

fn io_error(e: std::io::Error) -> ApiError {
    ApiError::Crm(CrmError::invalid("request", format!("failed to read request: {}", e)))
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Percent-decode one path segment. Unlike query values, `+` stays literal.
fn decode_segment(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}

/// Resolve the caller from the auth proxy headers.
fn identity(headers: &HashMap<String, String>) -> std::result::Result<AccessContext, ApiError> {
    let user_id = headers
        .get(HEADER_USER_ID)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Unauthenticated("missing X-User-Id header".into()))?;
    let role: UserRole = headers
        .get(HEADER_USER_ROLE)
        .ok_or_else(|| ApiError::Unauthenticated("missing X-User-Role header".into()))?
        .parse()
        .map_err(ApiError::Unauthenticated)?;

    Ok(AccessContext::resolve(
        user_id,
        role,
        headers.get(HEADER_PREPARER_ID).map(String::as_str),
    )?)
}

fn contact_id(raw: &str) -> std::result::Result<Uuid, CrmError> {
    Uuid::parse_str(raw).map_err(|_| CrmError::not_found("Contact", raw))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, CrmError> {
    let body = if body.is_empty() { b"{}".as_slice() } else { body };
    serde_json::from_slice(body).map_err(|e| CrmError::invalid("body", format!("invalid JSON: {}", e)))
}

fn query_u32(query: &HashMap<String, String>, key: &str) -> std::result::Result<Option<u32>, CrmError> {
    query
        .get(key)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<u32>()
                .map_err(|_| CrmError::invalid(key, "must be a non-negative integer"))
        })
        .transpose()
}

fn list_params(
    query: &HashMap<String, String>,
) -> std::result::Result<(ContactFilters, Pagination), CrmError> {
    let mut errors = Vec::new();

    let stage = match query.get("stage").filter(|v| !v.is_empty()) {
        Some(s) => s.parse::<Stage>().map_err(|e| errors.push(FieldError::new("stage", e))).ok(),
        None => None,
    };
    let contact_type = match query.get("type").filter(|v| !v.is_empty()) {
        Some(t) => t.parse::<ContactType>().map_err(|e| errors.push(FieldError::new("type", e))).ok(),
        None => None,
    };
    let page = query_u32(query, "page").unwrap_or_else(|e| {
        errors.extend(e.fields().unwrap_or_default().iter().cloned());
        None
    });
    let limit = query_u32(query, "limit").unwrap_or_else(|e| {
        errors.extend(e.fields().unwrap_or_default().iter().cloned());
        None
    });

    if !errors.is_empty() {
        return Err(CrmError::Validation(errors));
    }

    let filters = ContactFilters {
        stage,
        contact_type,
        search: query.get("search").cloned(),
        assigned_preparer_id: query.get("assigned").filter(|v| !v.is_empty()).cloned(),
    };
    let pagination = Pagination::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE));
    Ok((filters, pagination))
}

fn error_reply(err: ApiError) -> Reply {
    let (status, body): (u16, ApiResponse<()>) = match err {
        ApiError::Crm(e) => {
            let status = e.status_code();
            if status >= 500 {
                tracing::error!(error = %e, "request failed");
            }
            (status, ApiResponse::from_error(&e))
        }
        ApiError::Unauthenticated(msg) => (401, ApiResponse::err(msg)),
        ApiError::PayloadTooLarge => (413, ApiResponse::err("Request body too large")),
        ApiError::RouteNotFound => (404, ApiResponse::err("Not found")),
    };
    let value = serde_json::to_value(body).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn send_json_response(stream: &mut TcpStream, status: u16, body: &serde_json::Value) -> Result<()> {
    let json_body = serde_json::to_string(body)?;

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        json_body.len(),
        json_body
    );

    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}
