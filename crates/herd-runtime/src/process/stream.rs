//! stdout event stream and stderr logging.
//!
//! stdout is read in raw chunks (not lines): llama.cpp prints tokens without
//! newlines. stderr is line-oriented progress output and only goes to the
//! log, decoded lossily since C++ tooling can emit non-UTF8 bytes.

use futures_util::{StreamExt, stream};
use herd_core::{ProcessEvent, ProcessEventStream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Turn a stdout pipe into a tagged event stream.
///
/// Yields `Data` per chunk read, then exactly one terminal `Closed` (EOF) or
/// `Errored` (read failure), then ends.
pub fn stdout_events<R>(reader: R) -> ProcessEventStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let chunks = ReaderStream::new(reader);
    Box::pin(stream::unfold(Some(chunks), |state| async move {
        let mut chunks = state?;
        match chunks.next().await {
            Some(Ok(bytes)) => Some((ProcessEvent::Data(bytes), Some(chunks))),
            Some(Err(e)) => Some((ProcessEvent::Errored(e.to_string()), None)),
            None => Some((ProcessEvent::Closed, None)),
        }
    }))
}

/// Log every stderr line at debug level until the pipe closes.
pub fn spawn_stderr_logger(stream: impl AsyncRead + Unpin + Send + 'static, pid: Option<u32>) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']);
                    if !line.is_empty() {
                        debug!(pid = ?pid, "stderr: {}", line);
                    }
                }
                Err(e) => {
                    debug!(pid = ?pid, error = %e, "stderr reader exiting due to read error");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn stdout_events_end_with_closed() {
        let events: Vec<ProcessEvent> = stdout_events(&b" Hello world"[..]).collect().await;
        assert_eq!(
            events,
            vec![
                ProcessEvent::Data(Bytes::from_static(b" Hello world")),
                ProcessEvent::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn stdout_events_empty_pipe_closes() {
        let events: Vec<ProcessEvent> = stdout_events(&b""[..]).collect().await;
        assert_eq!(events, vec![ProcessEvent::Closed]);
    }

    #[tokio::test]
    async fn stdout_events_read_error_is_terminal() {
        let reader = failing_reader();
        let events: Vec<ProcessEvent> = stdout_events(reader).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ProcessEvent::Errored(_)));
    }

    /// Reader yielding one chunk, then an I/O error.
    fn failing_reader() -> impl AsyncRead + Unpin + Send + 'static {
        use std::pin::Pin;
        use std::task::{Context, Poll};
        use tokio::io::ReadBuf;

        struct FailingReader {
            sent: bool,
        }

        impl AsyncRead for FailingReader {
            fn poll_read(
                mut self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                buf: &mut ReadBuf<'_>,
            ) -> Poll<std::io::Result<()>> {
                if self.sent {
                    return Poll::Ready(Err(std::io::Error::other("pipe broke")));
                }
                self.sent = true;
                buf.put_slice(b"tok");
                Poll::Ready(Ok(()))
            }
        }

        FailingReader { sent: false }
    }
}
