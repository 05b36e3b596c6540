//! Readers for the child's output pipes.

use super::RunSink;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Marks the stderr block so presentation layers can tell it apart from stdout.
pub const STDERR_PREFIX: &str = "[ERROR]\n";

/// Forward each stdout line to the sink as soon as it is complete.
///
/// `delivered` is bumped per line so the count survives a mid-stream error.
pub(crate) async fn relay_lines<R>(
    reader: R,
    sink: &dyn RunSink,
    delivered: &mut u64,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        sink.on_output_line(&decode_line(&buf));
        *delivered += 1;
    }
}

/// Read a stream to EOF. Runs beside the stdout relay so neither pipe fills up.
pub(crate) async fn collect_stream<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Wrap collected stderr for delivery, or `None` when there is nothing to show.
pub(crate) fn stderr_block(text: &str) -> Option<String> {
    let body = text.trim_end_matches(['\r', '\n']);
    if body.is_empty() {
        None
    } else {
        Some(format!("{STDERR_PREFIX}{body}"))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Yields `data`, then fails every further read.
#[cfg(test)]
pub(crate) struct FailingReader {
    pub data: &'static [u8],
}

#[cfg(test)]
impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.data.is_empty() {
            return std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe broke",
            )));
        }
        let n = self.data.len().min(buf.remaining());
        buf.put_slice(&self.data[..n]);
        self.data = &self.data[n..];
        std::task::Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl RunSink for Lines {
        fn on_output_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
        fn on_error(&self, _text: &str) {}
        fn on_state(&self, _state: RunState) {}
    }

    #[tokio::test]
    async fn splits_lines_and_strips_terminators() {
        let sink = Lines::default();
        let mut n = 0;
        let input: &[u8] = b"first\r\nsecond\n\nlast without newline";
        relay_lines(input, &sink, &mut n).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(
            *sink.0.lock().unwrap(),
            ["first", "second", "", "last without newline"]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let sink = Lines::default();
        let mut n = 0;
        let input: &[u8] = b"ok \xff\n";
        relay_lines(input, &sink, &mut n).await.unwrap();
        assert_eq!(*sink.0.lock().unwrap(), ["ok \u{fffd}"]);
    }

    #[tokio::test]
    async fn read_error_stops_the_relay_after_delivered_lines() {
        let sink = Lines::default();
        let mut n = 0;
        let input = FailingReader {
            data: b"one\npartial",
        };
        let err = relay_lines(input, &sink, &mut n).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(n, 1);
        assert_eq!(*sink.0.lock().unwrap(), ["one"]);
    }

    #[tokio::test]
    async fn collects_whole_stream() {
        let input: &[u8] = b"one\ntwo\n";
        assert_eq!(collect_stream(input).await.unwrap(), "one\ntwo\n");
    }

    #[test]
    fn stderr_block_is_prefixed_and_skips_empty() {
        assert_eq!(stderr_block(""), None);
        assert_eq!(stderr_block("\n"), None);
        assert_eq!(
            stderr_block("disk full\n").as_deref(),
            Some("[ERROR]\ndisk full")
        );
    }
}
