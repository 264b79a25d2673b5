use std::time::Duration;
use thiserror::Error;

/// Failures raised by the FTP client side of the gateway.
///
/// The variants follow the stages of a session: connecting, authenticating,
/// negotiating the transfer, and moving bytes. Each maps to one HTTP status
/// (see `http_status`), so the gateway never has to guess.
#[derive(Error, Debug)]
pub enum FtpError {
    #[error("Connection to {0} failed: {1}")]
    Connect(String, std::io::Error),

    #[error("FTP operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server refused {verb}: {reply}")]
    Rejected { verb: &'static str, reply: String },

    #[error("Transfer failed: {0}")]
    Transfer(#[from] std::io::Error),
}

impl FtpError {
    /// HTTP status presented to the client when the failure happens before
    /// any response bytes have been sent.
    pub fn http_status(&self) -> u16 {
        match self {
            // A refused RETR/LIST means the remote file does not exist (or
            // is not retrievable), which is a 404 from the client's view.
            FtpError::Rejected { .. } => 404,
            _ => 500,
        }
    }
}
