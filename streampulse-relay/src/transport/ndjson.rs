use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::FrameStream;
use crate::RelayError;

/// Read newline-delimited frames from any async reader.
///
/// Blank lines are skipped. End of input yields [`RelayError::Closed`].
///
/// ```
/// use futures_util::StreamExt;
/// use std::io::Cursor;
/// use streampulse_relay::transport::ndjson_frames;
///
/// # tokio_test::block_on(async {
/// let mut frames = ndjson_frames(Cursor::new(b"{\"a\":1}\n\n{\"a\":2}\n".to_vec()));
/// assert_eq!(frames.next().await.unwrap().unwrap(), "{\"a\":1}");
/// assert_eq!(frames.next().await.unwrap().unwrap(), "{\"a\":2}");
/// assert!(frames.next().await.unwrap().is_err());
/// assert!(frames.next().await.is_none());
/// # });
/// ```
pub fn ndjson_frames<R>(reader: R) -> FrameStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let lines = BufReader::new(reader).lines();

    futures_util::stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some((Ok(line), Some(lines))),
                Ok(None) => return Some((Err(RelayError::Closed), None)),
                Err(e) => return Some((Err(e.into()), None)),
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn handles_crlf_and_missing_final_newline() {
        let data = "{\"a\":1}\r\n{\"a\":2}";
        let frames: Vec<_> = ndjson_frames(Cursor::new(data.as_bytes().to_vec()))
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_deref(), Ok("{\"a\":1}"));
        assert_eq!(frames[1].as_deref(), Ok("{\"a\":2}"));
        assert_eq!(frames[2], Err(RelayError::Closed));
    }

    #[tokio::test]
    async fn empty_input_is_closed() {
        let frames: Vec<_> = ndjson_frames(Cursor::new(Vec::new())).collect().await;
        assert_eq!(frames, vec![Err(RelayError::Closed)]);
    }
}
