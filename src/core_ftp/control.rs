use log::{debug, trace, warn};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core_ftp::error::FtpError;
use crate::core_ftp::reply::{read_reply, Reply};

/// One authenticated FTP control connection.
///
/// A session lives for exactly one logical operation (one RETR or one LIST)
/// and is torn down afterwards. Sessions are never shared or pooled across
/// HTTP requests; pooling would leak working directory and transfer-type
/// state between unrelated requests.
#[derive(Debug)]
pub struct FtpControlSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    limit: Duration,
}

impl FtpControlSession {
    /// Opens the control connection and consumes the `220` greeting.
    ///
    /// Every step, including the TCP connect itself, runs under the
    /// configured timeout so a dead FTP host cannot hang the HTTP worker.
    pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<Self, FtpError> {
        let target = format!("{}:{}", host, port);
        let stream = timeout(limit, TcpStream::connect((host, port)))
            .await
            .map_err(|_| FtpError::Timeout(limit))?
            .map_err(|e| FtpError::Connect(target.clone(), e))?;

        let (read_half, write_half) = stream.into_split();
        let mut session = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            limit,
        };

        let greeting = session.read_reply().await?;
        if greeting.code != 220 {
            return Err(FtpError::Protocol(format!(
                "Unexpected greeting: {} {}",
                greeting.code, greeting.text
            )));
        }
        debug!("Connected to FTP server {}: {}", target, greeting.text);
        Ok(session)
    }

    /// USER/PASS handshake. Expects `331` then `230`; anything else is an
    /// authentication failure.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), FtpError> {
        let reply = self.command("USER", Some(username)).await?;
        if reply.code != 331 {
            return Err(FtpError::Auth(format!(
                "USER rejected: {} {}",
                reply.code, reply.text
            )));
        }

        let reply = self.command("PASS", Some(password)).await?;
        if reply.code != 230 {
            return Err(FtpError::Auth(format!(
                "PASS rejected: {} {}",
                reply.code, reply.text
            )));
        }
        debug!("Authenticated as {}", username);
        Ok(())
    }

    /// Forces binary transfer mode (`TYPE I`). ASCII mode would corrupt any
    /// non-text payload by rewriting line endings in flight.
    pub async fn binary_mode(&mut self) -> Result<(), FtpError> {
        let reply = self.command("TYPE", Some("I")).await?;
        if !reply.is_positive() {
            return Err(FtpError::Protocol(format!(
                "TYPE I rejected: {} {}",
                reply.code, reply.text
            )));
        }
        Ok(())
    }

    /// Sends one command line and waits for its reply.
    ///
    /// The control channel is strictly half-duplex request/reply; there is no
    /// pipelining, so a command always pairs with the next reply read.
    pub async fn command(&mut self, verb: &str, arg: Option<&str>) -> Result<Reply, FtpError> {
        let line = match arg {
            Some(arg) => format!("{} {}\r\n", verb, arg),
            None => format!("{}\r\n", verb),
        };
        trace!("FTP >> {}", line.trim_end());
        timeout(self.limit, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| FtpError::Timeout(self.limit))?
            .map_err(FtpError::Transfer)?;

        let reply = self.read_reply().await?;
        trace!("FTP << {} {}", reply.code, reply.text);
        Ok(reply)
    }

    /// Reads one reply without sending anything first. Needed after a data
    /// transfer, when the server volunteers its `226` completion line.
    pub async fn read_reply(&mut self) -> Result<Reply, FtpError> {
        read_reply(&mut self.reader, self.limit).await
    }

    /// Best-effort `QUIT` and unconditional teardown. Reply and write errors
    /// are ignored; the socket is released either way when `self` drops.
    pub async fn quit(mut self) {
        let farewell = timeout(self.limit, self.writer.write_all(b"QUIT\r\n")).await;
        if farewell.is_err() {
            warn!("QUIT write timed out, closing control connection anyway");
        }
        let _ = timeout(self.limit, self.read_reply()).await;
    }
}
