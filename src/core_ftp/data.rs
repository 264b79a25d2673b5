use log::debug;
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core_ftp::control::FtpControlSession;
use crate::core_ftp::error::FtpError;

fn pasv_regex() -> &'static Regex {
    static PASV_RE: OnceLock<Regex> = OnceLock::new();
    PASV_RE.get_or_init(|| {
        Regex::new(r"\((\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})\)")
            .expect("PASV sextuple pattern is valid")
    })
}

/// Parses the parenthesized sextuple out of a `227` reply.
///
/// RFC 959 encodes the endpoint as `(h1,h2,h3,h4,p1,p2)` with
/// port = p1*256 + p2. Servers wrap the group in arbitrary prose, so the
/// first parenthesized sextuple anywhere in the text wins. A reply without a
/// well-formed group is a protocol error; there is nothing to retry.
pub fn parse_pasv_reply(text: &str) -> Result<SocketAddrV4, FtpError> {
    let captures = pasv_regex().captures(text).ok_or_else(|| {
        FtpError::Protocol(format!("No passive endpoint in PASV reply: {:?}", text))
    })?;

    let mut octets = [0u8; 6];
    for (slot, capture) in octets.iter_mut().zip(captures.iter().skip(1)) {
        let digits = capture.map(|m| m.as_str()).unwrap_or_default();
        *slot = digits.parse().map_err(|_| {
            FtpError::Protocol(format!("Passive endpoint octet out of range: {}", digits))
        })?;
    }

    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = u16::from(octets[4]) * 256 + u16::from(octets[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Sends `PASV` and decodes the returned data-channel endpoint.
pub async fn enter_passive(session: &mut FtpControlSession) -> Result<SocketAddrV4, FtpError> {
    let reply = session.command("PASV", None).await?;
    if reply.code != 227 {
        return Err(FtpError::Protocol(format!(
            "PASV rejected: {} {}",
            reply.code, reply.text
        )));
    }
    let endpoint = parse_pasv_reply(&reply.text)?;
    debug!("Passive endpoint negotiated: {}", endpoint);
    Ok(endpoint)
}

/// Opens the data connection to a negotiated passive endpoint.
///
/// Passive mode requires a fresh data connection per transfer; the returned
/// stream carries exactly one file body or one listing and is then dropped.
pub async fn open_data_channel(
    endpoint: SocketAddrV4,
    limit: Duration,
) -> Result<TcpStream, FtpError> {
    timeout(limit, TcpStream::connect(endpoint))
        .await
        .map_err(|_| FtpError::Timeout(limit))?
        .map_err(|e| FtpError::Connect(endpoint.to_string(), e))
}
