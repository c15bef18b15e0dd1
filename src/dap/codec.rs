//! DAP base-protocol framing
//!
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

/// Upper bound on a single adapter message
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length:";

/// Read one framed message body
pub async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut content_length = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await.map_err(adapter_io)? == 0 {
            return Err(Error::AdapterCrashed);
        }

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.strip_prefix(CONTENT_LENGTH) {
            let value = value.trim();
            let len = value
                .parse::<usize>()
                .map_err(|_| Error::DapProtocol(format!("Invalid Content-Length: {}", value)))?;
            content_length = Some(len);
        }
    }

    let len =
        content_length.ok_or_else(|| Error::DapProtocol("Missing Content-Length header".into()))?;
    if len > MAX_FRAME_LEN {
        return Err(Error::DapProtocol(format!(
            "Content-Length too large: {} bytes",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(adapter_io)?;
    String::from_utf8(body).map_err(|e| Error::DapProtocol(format!("Invalid UTF-8: {}", e)))
}

/// Write one framed message body
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> Result<()> {
    let mut frame = format!("{} {}\r\n\r\n", CONTENT_LENGTH, body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn adapter_io(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::AdapterCrashed
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn reader(data: &[u8]) -> BufReader<Cursor<Vec<u8>>> {
        BufReader::new(Cursor::new(data.to_vec()))
    }

    #[tokio::test]
    async fn test_read_frame_skips_other_headers() {
        let mut r =
            reader(b"Content-Type: application/json\r\nContent-Length: 11\r\n\r\n{\"seq\":1}  ");
        assert_eq!(read_frame(&mut r).await.unwrap(), "{\"seq\":1}  ");
    }

    #[tokio::test]
    async fn test_back_to_back_frames() {
        let mut out = Vec::new();
        write_frame(&mut out, "{\"a\":1}").await.unwrap();
        write_frame(&mut out, "{\"b\":2}").await.unwrap();

        let mut r = reader(&out);
        assert_eq!(read_frame(&mut r).await.unwrap(), "{\"a\":1}");
        assert_eq!(read_frame(&mut r).await.unwrap(), "{\"b\":2}");
        assert!(matches!(read_frame(&mut r).await, Err(Error::AdapterCrashed)));
    }

    #[tokio::test]
    async fn test_missing_length() {
        let mut r = reader(b"Content-Type: application/json\r\n\r\n{}");
        assert!(matches!(read_frame(&mut r).await, Err(Error::DapProtocol(_))));
    }

    #[tokio::test]
    async fn test_truncated_body_is_crash() {
        let mut r = reader(b"Content-Length: 40\r\n\r\n{\"short\":true}");
        assert!(matches!(read_frame(&mut r).await, Err(Error::AdapterCrashed)));
    }
}
