//! Output backends for emitting report documents.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::report::ReportDocument;

/// Destination for the report documents produced by a [`QualityService`].
///
/// [`QualityService`]: crate::QualityService
#[derive(Debug, Clone)]
pub enum Output {
    /// Write documents to a JSON file, overwritten by each run.
    File(PathBuf),

    /// Send documents to a TCP server as newline-delimited JSON.
    Tcp(String),

    /// Send documents through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<ReportDocument>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dqmwatch_core::Output;
    ///
    /// let output = Output::file("qreports.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dqmwatch_core::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // while let Some(document) = rx.recv().await {
    /// //     println!("{} report(s)", document.qreports.len());
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ReportDocument>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Emit a document to this output.
    pub(crate) async fn emit(&self, document: &ReportDocument) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let json = serde_json::to_string_pretty(document)?;
                tokio::fs::write(path, json).await?;
            }
            Output::Tcp(addr) => {
                use tokio::io::AsyncWriteExt;
                use tokio::net::TcpStream;

                // Best effort: an unreachable collector drops the document.
                if let Ok(mut stream) = TcpStream::connect(addr).await {
                    let json = serde_json::to_string(document)?;
                    stream.write_all(json.as_bytes()).await?;
                    stream.write_all(b"\n").await?;
                }
            }
            Output::Channel(tx) => {
                // Never block the worker on a full channel.
                let _ = tx.try_send(document.clone());
            }
        }
        Ok(())
    }
}
