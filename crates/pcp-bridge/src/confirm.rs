//! Operator confirmation

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConfirmError;

/// Asks the operator a yes/no question.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &str, title: &str) -> Result<bool, ConfirmError>;
}

/// Answers every question with the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmer(pub bool);

#[async_trait]
impl Confirmer for FixedConfirmer {
    async fn confirm(&self, _prompt: &str, _title: &str) -> Result<bool, ConfirmError> {
        Ok(self.0)
    }
}

/// Prompts on a line-oriented terminal.
///
/// One question at a time: concurrent confirmations wait for the current
/// answer. Only `y` and `yes` (any case) count as yes.
pub struct PromptConfirmer<R, W> {
    io: Mutex<(BufReader<R>, W)>,
}

/// Prompts on the daemon's own terminal
pub type ConsoleConfirmer = PromptConfirmer<Stdin, Stdout>;

impl ConsoleConfirmer {
    pub fn console() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> PromptConfirmer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((BufReader::new(reader), writer)),
        }
    }
}

#[async_trait]
impl<R, W> Confirmer for PromptConfirmer<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn confirm(&self, prompt: &str, title: &str) -> Result<bool, ConfirmError> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        writer
            .write_all(format!("[{}] {} [y/N] ", title, prompt).as_bytes())
            .await?;
        writer.flush().await?;

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ConfirmError::Closed);
        }
        let answer = line.trim().to_ascii_lowercase();
        debug!(title, answer = %answer, "Operator answered");
        Ok(answer == "y" || answer == "yes")
    }
}
