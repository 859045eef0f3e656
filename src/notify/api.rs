//! Delivery through a transactional email provider's JSON HTTP API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmailDispatcher, NotificationError, OutboundEmail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

pub struct ApiDispatcher {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl ApiDispatcher {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, NotificationError> {
        let url = url.into();
        let parsed = url::Url::parse(&url)
            .map_err(|e| NotificationError::Transport(format!("invalid email API URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotificationError::Transport(format!(
                "invalid email API URL {}: must start with http:// or https://",
                url
            )));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("leadbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key: api_key.into(),
        })
    }
}

impl EmailDispatcher for ApiDispatcher {
    fn send(&self, email: &OutboundEmail) -> Result<String, NotificationError> {
        let body = SendRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| NotificationError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = response
            .json()
            .map_err(|e| NotificationError::Transport(format!("unexpected response: {}", e)))?;
        Ok(parsed.id)
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    fn one_shot_server(status_line: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/emails", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body_buf = vec![0u8; content_length];
            reader.read_exact(&mut body_buf).unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            head + &String::from_utf8(body_buf).unwrap()
        });
        (url, handle)
    }

    fn email() -> OutboundEmail {
        OutboundEmail {
            from: "crm@example.com".into(),
            to: "ops@example.com".into(),
            subject: "New lead".into(),
            html: "<p>x</p>".into(),
        }
    }

    #[test]
    fn test_send_returns_provider_id() {
        let (url, handle) = one_shot_server("200 OK", r#"{"id":"msg_123"}"#);
        let dispatcher = ApiDispatcher::new(url, "key-abc").unwrap();

        let id = dispatcher.send(&email()).unwrap();
        assert_eq!(id, "msg_123");

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /emails"));
        assert!(request.to_lowercase().contains("authorization: bearer key-abc"));
        assert!(request.contains(r#""subject":"New lead""#));
    }

    #[test]
    fn test_error_status_is_rejected() {
        let (url, handle) = one_shot_server("422 Unprocessable Entity", r#"{"message":"bad to"}"#);
        let dispatcher = ApiDispatcher::new(url, "key-abc").unwrap();

        let err = dispatcher.send(&email()).unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { status: 422, .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(ApiDispatcher::new("ftp://mail", "k").is_err());
        assert!(ApiDispatcher::new("mail.example.com/emails", "k").is_err());
    }
}
