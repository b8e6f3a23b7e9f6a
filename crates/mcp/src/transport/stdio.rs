//! Newline-delimited JSON-RPC over a byte stream.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{MAX_MESSAGE_SIZE, Transport};
use crate::error::{Error, Result};

/// One JSON message per line over any reader/writer pair.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<()> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<String> {
        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(Error::HostExited);
            }

            if line.len() > MAX_MESSAGE_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_MESSAGE_SIZE,
                });
            }

            let message = line.trim();
            if !message.is_empty() {
                return Ok(message.to_string());
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A tool host running as a child process.
pub struct StdioTransport {
    process: Child,
    lines: LineTransport<BufReader<ChildStdout>, ChildStdin>,
    closed: bool,
}

impl StdioTransport {
    /// Spawn the host process with piped stdin/stdout. Stderr is inherited.
    pub fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        Ok(Self {
            process,
            lines: LineTransport::new(BufReader::new(stdout), stdin),
            closed: false,
        })
    }

    /// Check if the host process is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }
}

impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.lines.send(message).await
    }

    async fn receive(&mut self) -> Result<String> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.lines.receive().await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing stdin lets a well-behaved host exit on its own.
        let _ = self.lines.close().await;
        if self.is_running() {
            let _ = self.process.kill().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};

    #[tokio::test]
    async fn line_transport_round_trip() {
        let (near, far) = duplex(1024);
        let (near_read, near_write) = split(near);
        let (far_read, far_write) = split(far);
        let mut client = LineTransport::new(BufReader::new(near_read), near_write);
        let mut host = LineTransport::new(BufReader::new(far_read), far_write);

        client.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap();
        let received = host.receive().await.unwrap();
        assert_eq!(received, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let input: &[u8] = b"\n\n  \n{\"ok\":true}\n";
        let mut transport = LineTransport::new(BufReader::new(input), tokio::io::sink());
        assert_eq!(transport.receive().await.unwrap(), "{\"ok\":true}");
    }

    #[tokio::test]
    async fn end_of_stream_means_host_exited() {
        let input: &[u8] = b"";
        let mut transport = LineTransport::new(BufReader::new(input), tokio::io::sink());
        assert!(matches!(transport.receive().await, Err(Error::HostExited)));
    }
}
