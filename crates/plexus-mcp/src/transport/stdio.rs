//! Child-process transport speaking newline-delimited JSON

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use plexus_config::StdioConfig;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::{Transport, TransportError};

/// Newline-delimited JSON over any byte duplex
///
/// Wraps a child process's stdio in production; tests construct it over
/// `tokio::io::duplex` halves. Reading goes through a framed line decoder
/// whose buffer survives cancellation, so `recv` is safe to race in a
/// `select!` loop.
pub struct StreamTransport {
    reader: FramedRead<Box<dyn AsyncRead + Send + Unpin>, LinesCodec>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    child: Option<Child>,
}

impl StreamTransport {
    /// Wrap an arbitrary byte duplex
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: FramedRead::new(Box::new(reader), LinesCodec::new()),
            writer: Box::new(writer),
            child: None,
        }
    }
}

/// Spawn the configured child process and wire up its stdio
pub(crate) async fn spawn(config: &StdioConfig) -> Result<Box<dyn Transport>, TransportError> {
    let mut command = Command::new(&config.command);
    command
        .args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        // Child diagnostics share our stderr; stdout must stay protocol-clean
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| TransportError::Connect(format!("failed to spawn '{}': {e}", config.command)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| TransportError::Connect("child stdin unavailable".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TransportError::Connect("child stdout unavailable".to_string()))?;

    Ok(Box::new(StreamTransport {
        reader: FramedRead::new(Box::new(stdout), LinesCodec::new()),
        writer: Box::new(stdin),
        child: Some(child),
    }))
}

#[async_trait]
impl Transport for StreamTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message).map_err(|e| TransportError::Frame(e.to_string()))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        loop {
            match self.reader.next().await {
                None => return Ok(None),
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return serde_json::from_str(line.trim())
                        .map(Some)
                        .map_err(|e| TransportError::Frame(e.to_string()));
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(TransportError::Io(e)),
                Some(Err(e)) => return Err(TransportError::Frame(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut a = StreamTransport::new(client_read, client_write);
        let mut b = StreamTransport::new(server_read, server_write);

        let message = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        a.send(&message).await.unwrap();

        let received = b.recv().await.unwrap().unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn eof_yields_none() {
        let (client, server) = tokio::io::duplex(64);
        let (_client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut b = StreamTransport::new(server_read, server_write);
        drop(client_write);

        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_line_is_a_frame_error() {
        let (client, server) = tokio::io::duplex(64);
        let (_client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut b = StreamTransport::new(server_read, server_write);
        client_write.write_all(b"not json\n").await.unwrap();

        assert!(matches!(b.recv().await, Err(TransportError::Frame(_))));
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let (client, server) = tokio::io::duplex(4096);
        let (_client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let mut b = StreamTransport::new(server_read, server_write);
        client_write.write_all(b"\n\n{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n").await.unwrap();

        let received = b.recv().await.unwrap().unwrap();
        assert_eq!(received["id"], 2);
    }
}
