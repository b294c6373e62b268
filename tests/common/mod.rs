//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum_test::TestServer;
use mailhog::config::StorageKind;
use mailhog::web::create_router;
use mailhog::{Application, Config, RunningAddrs};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Configuration listening on ephemeral localhost ports and storing under `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.smtp.host = "127.0.0.1".to_string();
    config.smtp.port = 0;
    config.smtp.hostname = "mailhog.test".to_string();
    config.web.host = "127.0.0.1".to_string();
    config.web.port = 0;
    config.storage.kind = StorageKind::Maildir;
    config.storage.path = dir.path().join("maildir").to_string_lossy().into_owned();
    config
}

/// A running capture server and an API client for it.
pub struct TestApp {
    pub app: Application,
    pub addrs: RunningAddrs,
    pub api: TestServer,
}

impl TestApp {
    /// Start a capture server configured by `config`.
    pub async fn start(config: Config) -> Self {
        let app = Application::new(config).expect("Failed to open application");
        let addrs = app.start().await.expect("Failed to start listeners");
        let router = create_router(Arc::new(app.app_state()), app.config());
        let api = TestServer::new(router).expect("Failed to create test server");
        Self { app, addrs, api }
    }

    /// API client over a real HTTP connection, needed for WebSocket upgrades.
    pub fn http_api(&self) -> TestServer {
        let router = create_router(Arc::new(self.app.app_state()), self.app.config());
        TestServer::builder()
            .http_transport()
            .build(router)
            .expect("Failed to create test server")
    }

    /// Open an SMTP session with the capture server.
    pub async fn smtp(&self) -> SmtpClient {
        SmtpClient::connect(self.addrs.smtp).await
    }
}

/// Minimal SMTP client that reads complete (possibly multiline) replies.
pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// The greeting reply.
    pub greeting: (u16, String),
}

impl SmtpClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            greeting: (0, String::new()),
        };
        client.greeting = client.read_reply().await;
        client
    }

    /// Read one reply. Returns code 0 when the server closed the connection.
    pub async fn read_reply(&mut self) -> (u16, String) {
        let mut text = String::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.unwrap_or(0);
            if n == 0 {
                return (0, text);
            }
            text.push_str(&line);
            let bytes = line.as_bytes();
            if bytes.len() < 4 || bytes[3] != b'-' {
                let code = line.get(..3).and_then(|c| c.parse().ok()).unwrap_or(0);
                return (code, text);
            }
        }
    }

    /// Write raw bytes without waiting for a reply.
    pub async fn write(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.expect("Failed to write");
    }

    /// Send one command line and return the reply code.
    pub async fn command(&mut self, line: &str) -> u16 {
        self.write(format!("{line}\r\n").as_bytes()).await;
        self.read_reply().await.0
    }

    /// Run a complete transaction. `content` must end with CRLF; the
    /// terminating dot is added. Returns the final reply code.
    pub async fn send(&mut self, from: &str, to: &[&str], content: &str) -> u16 {
        assert_eq!(self.command("EHLO client.test").await, 250);
        assert_eq!(self.command(&format!("MAIL FROM:<{from}>")).await, 250);
        for rcpt in to {
            assert_eq!(self.command(&format!("RCPT TO:<{rcpt}>")).await, 250);
        }
        assert_eq!(self.command("DATA").await, 354);
        self.write(content.as_bytes()).await;
        self.write(b".\r\n").await;
        self.read_reply().await.0
    }

    pub async fn quit(mut self) {
        let _ = self.command("QUIT").await;
    }
}

/// Deliver one message and close the session.
pub async fn deliver(addr: SocketAddr, from: &str, to: &[&str], content: &str) {
    let mut client = SmtpClient::connect(addr).await;
    assert_eq!(client.send(from, to, content).await, 250);
    client.quit().await;
}
