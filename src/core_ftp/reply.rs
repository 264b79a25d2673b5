use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::time::timeout;

use crate::constants::{MAX_REPLY_LINES, MAX_REPLY_LINE_BYTES};
use crate::core_ftp::error::FtpError;

/// One complete FTP control-channel reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    /// `2xx` family, the generic success class.
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// `150`/`125`: the server is about to open (or reuse) the data
    /// connection for a transfer.
    pub fn is_transfer_start(&self) -> bool {
        self.code == 150 || self.code == 125
    }
}

/// Reads one full reply from the control channel, line by line.
///
/// A reply line is `<3 digits><space|dash><text>`; the code must sit at the
/// start of the line. A dash after the code opens a multi-line reply, which
/// is drained until the terminal line carrying the same code followed by a
/// space. Continuation text is discarded; the terminal line's text is kept,
/// which is the part carrying payload (PASV endpoints and the like).
pub async fn read_reply<R>(reader: &mut R, limit: Duration) -> Result<Reply, FtpError>
where
    R: AsyncBufRead + Unpin,
{
    let (code, separator, text) = read_reply_line(reader, limit).await?;

    if separator != b'-' {
        return Ok(Reply { code, text });
    }

    // Multi-line reply: drain until the matching terminal line. The count
    // is bounded so a peer streaming endless continuations cannot pin the
    // worker.
    for _ in 0..MAX_REPLY_LINES {
        let line = read_bounded_line(reader, limit).await?;
        if line.is_empty() {
            return Err(FtpError::Protocol(
                "Connection closed inside a multi-line reply".to_string(),
            ));
        }
        if let Some((line_code, sep, rest)) = split_reply_line(&line) {
            if line_code == code && sep == b' ' {
                return Ok(Reply {
                    code,
                    text: rest.to_string(),
                });
            }
        }
    }
    Err(FtpError::Protocol(format!(
        "Multi-line reply exceeds {} continuation lines",
        MAX_REPLY_LINES
    )))
}

async fn read_reply_line<R>(reader: &mut R, limit: Duration) -> Result<(u16, u8, String), FtpError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_bounded_line(reader, limit).await?;
    if line.is_empty() {
        return Err(FtpError::Protocol(
            "Connection closed while waiting for a reply".to_string(),
        ));
    }

    match split_reply_line(&line) {
        Some((code, sep, text)) => Ok((code, sep, text.to_string())),
        None => Err(FtpError::Protocol(format!(
            "Malformed reply line: {:?}",
            line.trim_end()
        ))),
    }
}

/// Reads one line under both the exchange timeout and a byte cap, so a peer
/// that streams without newlines cannot grow memory unboundedly. A closed
/// connection yields an empty string for the caller to diagnose.
async fn read_bounded_line<R>(reader: &mut R, limit: Duration) -> Result<String, FtpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = timeout(
        limit,
        reader
            .take(MAX_REPLY_LINE_BYTES as u64)
            .read_line(&mut line),
    )
    .await
    .map_err(|_| FtpError::Timeout(limit))?
    .map_err(FtpError::Transfer)?;
    if n == MAX_REPLY_LINE_BYTES && !line.ends_with('\n') {
        return Err(FtpError::Protocol(format!(
            "Reply line exceeds {} bytes",
            MAX_REPLY_LINE_BYTES
        )));
    }
    Ok(line)
}

/// Splits a raw line into (code, separator, text) when it starts with three
/// digits. Bare `ddd` lines are accepted with empty text.
fn split_reply_line(line: &str) -> Option<(u16, u8, &str)> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let bytes = trimmed.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code: u16 = trimmed[..3].parse().ok()?;
    if bytes.len() == 3 {
        return Some((code, b' ', ""));
    }
    match bytes[3] {
        sep @ (b' ' | b'-') => Some((code, sep, &trimmed[4..])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const LIMIT: Duration = Duration::from_secs(1);

    async fn parse(input: &[u8]) -> Result<Reply, FtpError> {
        let mut reader = BufReader::new(input);
        read_reply(&mut reader, LIMIT).await
    }

    #[tokio::test]
    async fn single_line_reply() {
        let reply = parse(b"220 Service ready\r\n").await.unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.text, "Service ready");
        assert!(reply.is_positive());
    }

    #[tokio::test]
    async fn multi_line_reply_is_drained() {
        let reply = parse(b"220-Welcome to example FTP\r\n220-Mirrors at example.org\r\n220 Ready\r\n")
            .await
            .unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.text, "Ready");
    }

    #[tokio::test]
    async fn continuation_lines_without_code_are_tolerated() {
        let reply = parse(b"211-Features:\r\n SIZE\r\n MDTM\r\n211 End\r\n")
            .await
            .unwrap();
        assert_eq!(reply.code, 211);
        assert_eq!(reply.text, "End");
    }

    #[tokio::test]
    async fn code_must_start_the_line() {
        let err = parse(b"ready 220\r\n").await.unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[tokio::test]
    async fn closed_connection_is_a_protocol_error() {
        let err = parse(b"").await.unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[tokio::test]
    async fn oversized_reply_line_is_rejected() {
        let mut input = b"220 ".to_vec();
        input.resize(MAX_REPLY_LINE_BYTES + 100, b'x');
        let err = parse(&input).await.unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[tokio::test]
    async fn endless_continuations_are_bounded() {
        let input = "220-still going\r\n".repeat(MAX_REPLY_LINES + 10);
        let err = parse(input.as_bytes()).await.unwrap_err();
        assert!(matches!(err, FtpError::Protocol(_)));
    }

    #[tokio::test]
    async fn bare_code_line_has_empty_text() {
        let reply = parse(b"226\r\n").await.unwrap();
        assert_eq!(reply.code, 226);
        assert_eq!(reply.text, "");
    }

    #[test]
    fn transfer_start_codes() {
        assert!(Reply { code: 150, text: String::new() }.is_transfer_start());
        assert!(Reply { code: 125, text: String::new() }.is_transfer_start());
        assert!(!Reply { code: 226, text: String::new() }.is_transfer_start());
    }
}
