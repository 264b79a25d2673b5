use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::constants::{MAX_LISTING_BYTES, TRANSFER_CHANNEL_DEPTH, TRANSFER_CHUNK_SIZE};
use crate::core_cache::{CacheStore, CacheWriter, InflightRegistry};
use crate::core_ftp::data::{enter_passive, open_data_channel};
use crate::core_ftp::list::{parse_listing, render_index};
use crate::core_ftp::{FtpControlSession, FtpError};
use crate::core_http::mime::content_type_for;
use crate::core_policy::PathPolicy;

/// Orchestrates one HTTP request end to end: policy check, cache lookup,
/// and on a miss the full FTP session with simultaneous stream-to-client
/// and stream-to-cache.
///
/// Every cache miss opens its own control and data connection pair and
/// tears both down when the transfer ends; nothing FTP-side is shared
/// between requests.
pub struct ProxyGateway {
    config: Arc<Config>,
    policy: PathPolicy,
    cache: Option<CacheStore>,
    inflight: InflightRegistry,
}

impl ProxyGateway {
    pub fn new(config: Arc<Config>, policy: PathPolicy) -> Self {
        let cache = config
            .cache
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| CacheStore::new(&c.root));
        Self {
            config,
            policy,
            cache,
            inflight: InflightRegistry::default(),
        }
    }

    /// Entry point for the HTTP bridge: takes the raw request path, returns
    /// the finished response.
    pub async fn handle(&self, raw_path: &str) -> Response {
        let decoded = match percent_decode_str(raw_path).decode_utf8() {
            Ok(path) => path.into_owned(),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "Malformed request path.\n").into_response()
            }
        };

        // The allow-list is a security boundary: a rejected path must never
        // reach the FTP layer.
        let resolved = match self.policy.resolve(&decoded) {
            Some(resolved) => resolved,
            None => return (StatusCode::NOT_FOUND, "File not found.\n").into_response(),
        };

        if resolved.is_listing {
            self.serve_listing(&resolved.remote_path).await
        } else {
            self.serve_file(&resolved.remote_path).await
        }
    }

    async fn serve_file(&self, remote_path: &str) -> Response {
        let Some(cache) = &self.cache else {
            return self.fetch_from_ftp(remote_path, None).await;
        };

        if let Some((file, size)) = cache.lookup(remote_path).await {
            return cached_response(remote_path, file, size);
        }

        // Per-path lock: at most one fetch in flight per remote path. Late
        // arrivals wait here, then find the committed entry on re-check.
        let guard = self.inflight.lock_for(remote_path).lock_owned().await;
        if let Some((file, size)) = cache.lookup(remote_path).await {
            return cached_response(remote_path, file, size);
        }

        self.fetch_from_ftp(remote_path, Some(guard)).await
    }

    /// Runs the full FTP sequence up to an accepted RETR, then hands the
    /// open data connection to a drain task and returns a streaming
    /// response.
    ///
    /// Everything that can still change the HTTP status happens before this
    /// returns; once the body starts, a failure can only terminate the
    /// chunked stream early (logged server-side, an inherent limit of
    /// streaming proxies).
    async fn fetch_from_ftp(
        &self,
        remote_path: &str,
        guard: Option<OwnedMutexGuard<()>>,
    ) -> Response {
        let (ctrl, data) = match self.start_transfer("RETR", remote_path).await {
            Ok(pair) => pair,
            Err(err) => return ftp_error_response(remote_path, &err),
        };

        // A cache failure degrades to pass-through; the client still gets
        // its bytes.
        let writer = match &self.cache {
            Some(cache) => match cache.begin_write(remote_path).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!("Cache unavailable for {}: {}", remote_path, e);
                    None
                }
            },
            None => None,
        };

        let (tx, rx) = mpsc::channel(TRANSFER_CHANNEL_DEPTH);
        let data_timeout = self.config.data_timeout();
        let path = remote_path.to_string();
        tokio::spawn(async move {
            drain_transfer(ctrl, data, writer, tx, guard, path, data_timeout).await;
        });

        (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                content_type_for(remote_path).to_string(),
            )],
            Body::from_stream(ReceiverStream::new(rx)),
        )
            .into_response()
    }

    /// Fetches and renders a directory listing. Listings are small and
    /// never cached, so the raw text is buffered (bounded) and parsed in
    /// one go.
    async fn serve_listing(&self, remote_path: &str) -> Response {
        let (mut ctrl, mut data) = match self.start_transfer("LIST", remote_path).await {
            Ok(pair) => pair,
            Err(err) => return ftp_error_response(remote_path, &err),
        };

        let data_timeout = self.config.data_timeout();
        let mut raw = Vec::new();
        let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
        loop {
            let n = match timeout(data_timeout, data.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("Listing of {} failed: {}", remote_path, e);
                    ctrl.quit().await;
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Listing failed.\n")
                        .into_response();
                }
                Err(_) => {
                    error!("Listing of {} timed out", remote_path);
                    ctrl.quit().await;
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Listing failed.\n")
                        .into_response();
                }
            };
            raw.extend_from_slice(&buf[..n]);
            if raw.len() > MAX_LISTING_BYTES {
                error!("Listing of {} exceeds {} bytes", remote_path, MAX_LISTING_BYTES);
                ctrl.quit().await;
                return (StatusCode::INTERNAL_SERVER_ERROR, "Listing too large.\n")
                    .into_response();
            }
        }
        drop(data);

        match ctrl.read_reply().await {
            Ok(reply) if reply.code == 226 => {}
            Ok(reply) => warn!(
                "Listing of {} possibly incomplete: {} {}",
                remote_path, reply.code, reply.text
            ),
            Err(e) => warn!("Listing of {} possibly incomplete: {}", remote_path, e),
        }
        ctrl.quit().await;

        let text = String::from_utf8_lossy(&raw);
        let page = render_index(remote_path, &parse_listing(&text));
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8".to_string())],
            page,
        )
            .into_response()
    }

    /// Connects, authenticates, negotiates passive mode, and issues the
    /// transfer command. On success the returned data connection is open
    /// and the server has acknowledged the transfer start.
    async fn start_transfer(
        &self,
        verb: &'static str,
        remote_path: &str,
    ) -> Result<(FtpControlSession, TcpStream), FtpError> {
        let mut ctrl = FtpControlSession::connect(
            &self.config.ftp.host,
            self.config.ftp_port(),
            self.config.control_timeout(),
        )
        .await?;

        match self.negotiate(&mut ctrl, verb, remote_path).await {
            Ok(data) => Ok((ctrl, data)),
            Err(err) => {
                ctrl.quit().await;
                Err(err)
            }
        }
    }

    async fn negotiate(
        &self,
        ctrl: &mut FtpControlSession,
        verb: &'static str,
        remote_path: &str,
    ) -> Result<TcpStream, FtpError> {
        ctrl.login(&self.config.ftp.username, &self.config.ftp.password)
            .await?;
        ctrl.binary_mode().await?;

        let endpoint = enter_passive(ctrl).await?;
        let data = open_data_channel(endpoint, self.config.control_timeout()).await?;

        let arg = if remote_path.is_empty() {
            None
        } else {
            Some(remote_path)
        };
        let reply = ctrl.command(verb, arg).await?;
        if !reply.is_transfer_start() {
            // The transfer never started; the data connection is dropped
            // without reading a byte.
            drop(data);
            if reply.code >= 400 {
                return Err(FtpError::Rejected {
                    verb,
                    reply: format!("{} {}", reply.code, reply.text),
                });
            }
            return Err(FtpError::Protocol(format!(
                "Unexpected reply to {}: {} {}",
                verb, reply.code, reply.text
            )));
        }
        Ok(data)
    }
}

/// Copies the data connection to the HTTP body and, when enabled, to the
/// cache writer. HTTP delivery comes first: if the client is gone, the
/// whole transfer is abandoned, cache write included.
///
/// The in-flight guard rides along and releases when this task finishes,
/// after the cache entry has been committed or discarded.
async fn drain_transfer(
    mut ctrl: FtpControlSession,
    mut data: TcpStream,
    mut writer: Option<CacheWriter>,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    _guard: Option<OwnedMutexGuard<()>>,
    remote_path: String,
    data_timeout: Duration,
) {
    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut delivered: u64 = 0;

    loop {
        let n = match timeout(data_timeout, data.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!(
                    "Data connection for {} failed after {} bytes: {}",
                    remote_path, delivered, e
                );
                abort_writer(writer.take()).await;
                let _ = tx.send(Err(e)).await;
                ctrl.quit().await;
                return;
            }
            Err(_) => {
                error!(
                    "Data connection for {} idle past {:?} after {} bytes",
                    remote_path, data_timeout, delivered
                );
                abort_writer(writer.take()).await;
                let _ = tx
                    .send(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "data connection timed out",
                    )))
                    .await;
                ctrl.quit().await;
                return;
            }
        };

        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
            info!(
                "Client disconnected after {} bytes of {}; aborting transfer",
                delivered, remote_path
            );
            abort_writer(writer.take()).await;
            ctrl.quit().await;
            return;
        }
        delivered += n as u64;

        if let Some(w) = writer.as_mut() {
            if let Err(e) = w.write_chunk(&buf[..n]).await {
                warn!(
                    "Cache write for {} failed: {}; continuing pass-through",
                    remote_path, e
                );
                abort_writer(writer.take()).await;
            }
        }
    }
    drop(data);

    // Bytes already delivered stand regardless of what the control channel
    // says now; only the cache commit depends on the 226 confirmation.
    match ctrl.read_reply().await {
        Ok(reply) if reply.code == 226 => {
            if let Some(w) = writer.take() {
                if let Err(e) = w.commit().await {
                    warn!("Failed to commit cache entry for {}: {}", remote_path, e);
                }
            }
            info!("Transfer of {} complete ({} bytes)", remote_path, delivered);
        }
        Ok(reply) => {
            warn!(
                "Transfer of {} possibly incomplete ({} bytes): expected 226, got {} {}",
                remote_path, delivered, reply.code, reply.text
            );
            abort_writer(writer.take()).await;
        }
        Err(e) => {
            warn!(
                "Transfer of {} possibly incomplete ({} bytes): {}",
                remote_path, delivered, e
            );
            abort_writer(writer.take()).await;
        }
    }
    ctrl.quit().await;
}

async fn abort_writer(writer: Option<CacheWriter>) {
    if let Some(writer) = writer {
        writer.abort().await;
    }
}

fn cached_response(remote_path: &str, file: tokio::fs::File, size: u64) -> Response {
    let stream = ReaderStream::with_capacity(file, TRANSFER_CHUNK_SIZE);
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                content_type_for(remote_path).to_string(),
            ),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

fn ftp_error_response(remote_path: &str, err: &FtpError) -> Response {
    error!("FTP request for {} failed: {}", remote_path, err);
    let status = StatusCode::from_u16(err.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if status == StatusCode::NOT_FOUND {
        "File not found.\n"
    } else {
        "FTP proxy error.\n"
    };
    (status, body).into_response()
}
