//! Bidirectional event channel, one JSON envelope per line.

use crate::protocol::Envelope;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, warn};

#[async_trait]
pub trait EventChannel: Send {
    /// Next well-formed envelope, `None` once the peer closed the channel.
    async fn recv(&mut self) -> Result<Option<Envelope>>;

    async fn send(&mut self, envelope: &Envelope) -> Result<()>;
}

/// Line-framed JSON over any async byte stream pair.
pub struct LineChannel<R, W> {
    lines: Lines<R>,
    writer: W,
}

impl<R, W> LineChannel<BufReader<R>, W>
where
    R: tokio::io::AsyncRead + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }
}

impl LineChannel<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Channel over the process standard streams.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl<R, W> EventChannel for LineChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Envelope>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Envelope>(line) {
                Ok(envelope) => {
                    debug!(event = %envelope.event, "⬅️ Inbound event");
                    return Ok(Some(envelope));
                }
                Err(e) => warn!(error = %e, "Malformed envelope skipped"),
            }
        }
        Ok(None)
    }

    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let mut line = serde_json::to_vec(envelope)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
