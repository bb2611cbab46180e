//! Response encoding
//!
//! Only two responses exist: `200 OK` with the resource bytes, and a fixed
//! `404 Not Found` page. Every response closes the connection.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Body of every 404 response
pub const NOT_FOUND_BODY: &str = "<h1>404 Not Found</h1>";

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NotFound => 404,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "Not Found",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// A complete response, head plus body
#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    content_type: &'static str,
    body: Bytes,
}

impl Response {
    pub fn ok(content_type: &'static str, body: Bytes) -> Self {
        Self {
            status: Status::Ok,
            content_type,
            body,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            content_type: "text/html",
            body: Bytes::from_static(NOT_FOUND_BODY.as_bytes()),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Status line and headers, including the blank line
    pub fn head(&self) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.content_type,
            self.body.len()
        )
    }

    /// Write head and body to `writer` and flush
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(self.head().as_bytes()).await?;
        writer.write_all(&self.body).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_head() {
        let resp = Response::ok("text/css", Bytes::from_static(b"body{}"));
        assert_eq!(
            resp.head(),
            "HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 6\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_not_found_head() {
        let resp = Response::not_found();
        assert_eq!(resp.status().code(), 404);
        assert!(resp.head().starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(resp
            .head()
            .contains(&format!("Content-Length: {}\r\n", NOT_FOUND_BODY.len())));
        assert_eq!(resp.body().as_ref(), NOT_FOUND_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_write_to() {
        let resp = Response::ok("text/plain", Bytes::from_static(b"hello"));
        let mut out = Vec::new();
        resp.write_to(&mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }
}
