//! Per-connection SMTP driver.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::command::Command;
use super::error::{SmtpError, SmtpLimits};
use super::reply::Reply;
use super::session::{DataLine, Envelope, Session, SessionLimits, SessionState};
use crate::chaos::Chaos;
use crate::config::SmtpConfig;
use crate::storage::{Message, MessageStore};

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// Serves SMTP sessions, committing completed messages to the store.
#[derive(Clone)]
pub struct SmtpHandler {
    store: MessageStore,
    chaos: Arc<Chaos>,
    hostname: String,
    limits: SessionLimits,
    idle_timeout: Option<Duration>,
}

impl SmtpHandler {
    /// Create a handler.
    pub fn new(config: &SmtpConfig, store: MessageStore, chaos: Arc<Chaos>) -> Self {
        Self {
            store,
            chaos,
            hostname: config.hostname.clone(),
            limits: SessionLimits {
                max_message_size: config.max_message_size,
                max_recipients: config.max_recipients,
            },
            idle_timeout: (config.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.idle_timeout_secs)),
        }
    }

    /// Serve one connection until QUIT, EOF or error.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(peer = %peer, "SMTP session started");
        match self.serve(stream, peer).await {
            Ok(()) => info!(peer = %peer, "SMTP session ended"),
            Err(e) => warn!(peer = %peer, "SMTP session aborted: {}", e),
        }
    }

    async fn serve<S>(&self, stream: S, peer: SocketAddr) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        if self.chaos.reject_connection() {
            info!(peer = %peer, "Chaos: rejecting connection");
            return send(&mut writer, &Reply::closing(&self.hostname)).await;
        }

        let mut session = Session::new(self.hostname.clone(), self.limits);
        send(&mut writer, &session.greeting()).await?;

        let mut line = Vec::new();
        loop {
            let max = if session.state() == SessionState::Data {
                self.limits.max_message_size.saturating_add(2)
            } else {
                SmtpLimits::COMMAND_LINE_MAX_LENGTH
            };

            let read = match self.idle_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, read_line(&mut reader, &mut line, max)).await
                    {
                        Ok(read) => read?,
                        Err(_) => {
                            info!(peer = %peer, "SMTP session idle timeout");
                            return send(&mut writer, &Reply::closing(&self.hostname)).await;
                        }
                    }
                }
                None => read_line(&mut reader, &mut line, max).await?,
            };

            if read == LineRead::Eof {
                if session.state() == SessionState::Data {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed during DATA",
                    ));
                }
                debug!(peer = %peer, "Client closed connection");
                return Ok(());
            }

            if session.state() == SessionState::Data {
                if read == LineRead::TooLong {
                    session.mark_oversized();
                    continue;
                }
                match session.push_data_line(&line) {
                    DataLine::More => continue,
                    DataLine::TooLarge(reply) => {
                        warn!(peer = %peer, "Message rejected: too large");
                        send(&mut writer, &reply).await?;
                    }
                    DataLine::Complete(envelope) => {
                        let reply = self.commit(envelope, peer).await;
                        send(&mut writer, &reply).await?;
                    }
                }
            } else {
                let command = match read {
                    LineRead::TooLong => Err(SmtpError::LineTooLong {
                        max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
                    }),
                    _ => Command::parse(&String::from_utf8_lossy(&line)),
                };

                let quit = command == Ok(Command::Quit);
                let reply = match command {
                    Ok(command) => self.apply(&mut session, command, peer),
                    Err(e) => e.reply(),
                };
                send(&mut writer, &reply).await?;
                if quit {
                    return Ok(());
                }
            }

            if self.chaos.disconnect() {
                info!(peer = %peer, "Chaos: dropping connection");
                return Ok(());
            }
        }
    }

    fn apply(&self, session: &mut Session, command: Command, peer: SocketAddr) -> Reply {
        let rejected = match &command {
            Command::Mail { .. }
                if matches!(session.state(), SessionState::Mail | SessionState::Done) =>
            {
                self.chaos
                    .reject_sender()
                    .then(|| SmtpError::Rejected("sender rejected".to_string()))
            }
            Command::Rcpt(_) if session.state() == SessionState::Rcpt => self
                .chaos
                .reject_recipient()
                .then(|| SmtpError::Rejected("recipient rejected".to_string())),
            _ => None,
        };
        if let Some(err) = rejected {
            info!(peer = %peer, "Chaos: {}", err);
            return err.reply();
        }

        match session.handle(command) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(peer = %peer, "Command rejected: {}", e);
                e.reply()
            }
        }
    }

    async fn commit(&self, envelope: Envelope, peer: SocketAddr) -> Reply {
        let message = Message::new(envelope.from, envelope.to, envelope.raw);
        match self.store.put(message).await {
            Ok(id) => {
                info!(peer = %peer, id = %id, "Message received");
                Reply::queued(id)
            }
            Err(e) => {
                error!(peer = %peer, "Failed to store message: {}", e);
                SmtpError::StorageFailed.reply()
            }
        }
    }
}

async fn send<W>(writer: &mut W, reply: &Reply) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply.format().as_bytes()).await?;
    writer.flush().await
}

/// Read one LF-terminated line into `buf`, holding at most `max` bytes.
///
/// A longer line is consumed up to its terminator and reported as
/// `TooLong` with `buf` left empty.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut too_long = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(LineRead::Eof);
        }

        let (len, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        if !too_long && buf.len() + len <= max {
            buf.extend_from_slice(&available[..len]);
        } else {
            too_long = true;
            buf.clear();
        }
        reader.consume(len);

        if complete {
            return Ok(if too_long {
                LineRead::TooLong
            } else {
                LineRead::Line
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::ChaosSettings;
    use crate::MailhogError;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        /// Read one (possibly multiline) reply.
        async fn reply(&mut self) -> String {
            let mut out = String::new();
            loop {
                let mut line = String::new();
                let n = self.reader.read_line(&mut line).await.unwrap();
                if n == 0 {
                    return out;
                }
                out.push_str(&line);
                if line.as_bytes().get(3) == Some(&b' ') {
                    return out;
                }
            }
        }

        async fn send(&mut self, data: &str) {
            self.writer.write_all(data.as_bytes()).await.unwrap();
        }

        async fn cmd(&mut self, line: &str) -> String {
            self.send(&format!("{line}\r\n")).await;
            self.reply().await
        }
    }

    fn config() -> SmtpConfig {
        SmtpConfig {
            hostname: "mx.test".to_string(),
            max_message_size: 1024,
            max_recipients: 2,
            ..SmtpConfig::default()
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn start(handler: SmtpHandler) -> (Client, tokio::task::JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(async move { handler.handle(server, peer()).await });
        let (reader, writer) = tokio::io::split(client);
        (
            Client {
                reader: BufReader::new(reader),
                writer,
            },
            task,
        )
    }

    fn handler(store: &MessageStore) -> SmtpHandler {
        SmtpHandler::new(&config(), store.clone(), Arc::new(Chaos::disabled()))
    }

    #[tokio::test]
    async fn test_full_transaction() {
        let store = MessageStore::in_memory();
        let (mut client, task) = start(handler(&store));

        assert_eq!(client.reply().await, "220 mx.test ESMTP mailhog\r\n");
        let ehlo = client.cmd("EHLO client.test").await;
        assert!(ehlo.starts_with("250-mx.test Hello client.test\r\n"));
        assert!(ehlo.ends_with("250 SIZE 1024\r\n"));

        assert_eq!(client.cmd("MAIL FROM:<a@x.com>").await, "250 Ok\r\n");
        assert_eq!(client.cmd("RCPT TO:<b@y.com>").await, "250 Ok\r\n");
        assert!(client.cmd("DATA").await.starts_with("354 "));

        client.send("Subject: hi\r\n\r\n..hello\r\n").await;
        let queued = client.cmd(".").await;
        assert!(queued.starts_with("250 Ok: queued as "));

        assert_eq!(client.cmd("QUIT").await, "221 Bye\r\n");
        task.await.unwrap();

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "a@x.com");
        assert_eq!(messages[0].to, vec!["b@y.com"]);
        assert_eq!(messages[0].raw, b"Subject: hi\r\n\r\n.hello\r\n");
        assert!(queued.contains(&messages[0].id.to_string()));
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let store = MessageStore::in_memory();
        let (mut client, task) = start(handler(&store));
        client.reply().await;

        client
            .send("HELO c\r\nMAIL FROM:<a@x.com>\r\nRCPT TO:<b@y.com>\r\nDATA\r\n")
            .await;
        assert!(client.reply().await.starts_with("250 "));
        assert_eq!(client.reply().await, "250 Ok\r\n");
        assert_eq!(client.reply().await, "250 Ok\r\n");
        assert!(client.reply().await.starts_with("354 "));

        client.send("body\r\n.\r\nQUIT\r\n").await;
        assert!(client.reply().await.starts_with("250 Ok: queued"));
        assert_eq!(client.reply().await, "221 Bye\r\n");
        task.await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_during_data_stores_nothing() {
        let store = MessageStore::in_memory();
        let (mut client, task) = start(handler(&store));
        client.reply().await;
        client.cmd("HELO c").await;
        client.cmd("MAIL FROM:<a@x.com>").await;
        client.cmd("RCPT TO:<b@y.com>").await;
        client.cmd("DATA").await;
        client.send("Subject: partial\r\n").await;
        drop(client);

        task.await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_message() {
        let store = MessageStore::in_memory();
        let (mut client, task) = start(handler(&store));
        client.reply().await;
        client.cmd("HELO c").await;
        client.cmd("MAIL FROM:<a@x.com>").await;
        client.cmd("RCPT TO:<b@y.com>").await;
        client.cmd("DATA").await;

        client.send(&format!("{}\r\n", "x".repeat(2000))).await;
        client.send(&format!("{}\r\n", "y".repeat(100))).await;
        assert!(client.cmd(".").await.starts_with("552 "));

        // The session continues after the rejection.
        assert_eq!(client.cmd("MAIL FROM:<a@x.com>").await, "250 Ok\r\n");
        client.cmd("QUIT").await;
        task.await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_long_command_line() {
        let store = MessageStore::in_memory();
        let (mut client, task) = start(handler(&store));
        client.reply().await;

        let reply = client.cmd(&format!("HELO {}", "h".repeat(700))).await;
        assert!(reply.starts_with("500 "));
        assert!(client.cmd("HELO ok").await.starts_with("250 "));

        client.cmd("QUIT").await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_replies_451() {
        struct Broken;
        impl crate::storage::MessageBackend for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn load(&mut self) -> crate::Result<Vec<Message>> {
                Ok(Vec::new())
            }
            fn persist(&mut self, _: &Message) -> crate::Result<()> {
                Err(MailhogError::Storage("read-only".to_string()))
            }
            fn remove(&mut self, _: &crate::storage::MessageId) -> crate::Result<()> {
                Ok(())
            }
            fn clear(&mut self) -> crate::Result<()> {
                Ok(())
            }
        }

        let store = MessageStore::with_backend(Box::new(Broken)).unwrap();
        let (mut client, task) = start(handler(&store));
        client.reply().await;
        client.cmd("HELO c").await;
        client.cmd("MAIL FROM:<a@x.com>").await;
        client.cmd("RCPT TO:<b@y.com>").await;
        client.cmd("DATA").await;
        client.send("Subject: x\r\n\r\nbody\r\n").await;
        assert!(client.cmd(".").await.starts_with("451 "));

        // Connection stays usable.
        assert_eq!(client.cmd("NOOP").await, "250 Ok\r\n");
        client.cmd("QUIT").await;
        task.await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let store = MessageStore::in_memory();
        let config = SmtpConfig {
            idle_timeout_secs: 1,
            ..config()
        };
        let handler = SmtpHandler::new(&config, store, Arc::new(Chaos::disabled()));
        let (mut client, task) = start(handler);
        client.reply().await;

        let reply = tokio::time::timeout(Duration::from_secs(5), client.reply())
            .await
            .unwrap();
        assert!(reply.starts_with("421 "));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_chaos_rejections() {
        let store = MessageStore::in_memory();
        let chaos = Chaos::new(
            ChaosSettings {
                enabled: true,
                reject_connection_chance: 0.0,
                reject_sender_chance: 1.0,
                reject_recipient_chance: 0.0,
                disconnect_chance: 0.0,
            },
            None,
        );
        let handler = SmtpHandler::new(&config(), store, Arc::new(chaos));
        let (mut client, task) = start(handler);
        client.reply().await;
        client.cmd("HELO c").await;

        assert!(client.cmd("MAIL FROM:<a@x.com>").await.starts_with("550 "));
        // Sequencing still wins over chaos.
        assert!(client.cmd("RCPT TO:<b@y.com>").await.starts_with("503 "));

        client.cmd("QUIT").await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_chaos_reject_connection() {
        let chaos = Chaos::new(
            ChaosSettings {
                enabled: true,
                reject_connection_chance: 1.0,
                reject_sender_chance: 0.0,
                reject_recipient_chance: 0.0,
                disconnect_chance: 0.0,
            },
            None,
        );
        let handler = SmtpHandler::new(&config(), MessageStore::in_memory(), Arc::new(chaos));
        let (mut client, task) = start(handler);

        assert!(client.reply().await.starts_with("421 "));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_line_bounds() {
        let data: &[u8] = b"short\r\nthis line is too long\r\nnext\n";
        let mut reader = BufReader::new(data);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf, 10).await.unwrap(), LineRead::Line);
        assert_eq!(buf, b"short\r\n");
        assert_eq!(read_line(&mut reader, &mut buf, 10).await.unwrap(), LineRead::TooLong);
        assert!(buf.is_empty());
        assert_eq!(read_line(&mut reader, &mut buf, 10).await.unwrap(), LineRead::Line);
        assert_eq!(buf, b"next\n");
        assert_eq!(read_line(&mut reader, &mut buf, 10).await.unwrap(), LineRead::Eof);
    }
}
