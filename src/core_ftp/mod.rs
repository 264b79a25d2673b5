// FTP client side of the gateway: control channel, passive data channel,
// reply parsing, and LIST output handling.
pub mod control;
pub mod data;
pub mod error;
pub mod list;
pub mod reply;

pub use control::FtpControlSession;
pub use error::FtpError;
