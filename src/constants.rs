// src/constants.rs

pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Timeout applied to control-channel connects and every command/reply exchange.
pub const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 10;
/// Idle-read timeout on the passive data connection.
pub const DEFAULT_DATA_TIMEOUT_SECS: u64 = 30;

/// Chunk size used when draining a data connection or a cached file.
pub const TRANSFER_CHUNK_SIZE: usize = 8192;
/// Depth of the bounded channel between the FTP drain task and the HTTP body.
pub const TRANSFER_CHANNEL_DEPTH: usize = 32;

/// Upper bound on one control-channel reply line; RFC 959 replies are far
/// shorter, so anything beyond this is a misbehaving peer.
pub const MAX_REPLY_LINE_BYTES: usize = 4096;
/// Upper bound on continuation lines in one multi-line reply.
pub const MAX_REPLY_LINES: usize = 256;

/// Upper bound on a buffered LIST response before it is rejected.
pub const MAX_LISTING_BYTES: usize = 4 * 1024 * 1024;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
