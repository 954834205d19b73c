// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TCP server helpers for the calculation RPC surface.

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::{Frame, FrameError, FramedStream, MessageType};
use crate::messages::{ErrorCode, RpcRequest, RpcResponse, RpcStatus};

/// Errors that can occur in the RPC server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind error: {0}")]
    Bind(#[source] std::io::Error),

    #[error("accept error: {0}")]
    Accept(#[source] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// TCP server dispatching framed [`RpcRequest`]s to a handler closure.
///
/// Each connection is served on its own task and may carry any number of
/// sequential request/response exchanges.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind the server to the given address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(ServerError::Bind)?;
        info!(addr = %addr, "RPC server bound");
        Ok(Self { listener })
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Bind)
    }

    /// Run the accept loop until the cancellation token fires.
    pub async fn run<H, Fut>(
        &self,
        cancel: CancellationToken,
        handler: H,
    ) -> Result<(), ServerError>
    where
        H: Fn(RpcRequest) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = RpcResponse> + Send + 'static,
    {
        info!("RPC server running");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("RPC server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote_addr)) => {
                    debug!(%remote_addr, "accepted connection");
                    let handler = handler.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, cancel, handler).await;
                    });
                }
                Err(e) => {
                    warn!("failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection<H, Fut>(stream: TcpStream, cancel: CancellationToken, handler: H)
where
    H: Fn(RpcRequest) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResponse> + Send + 'static,
{
    let mut framed = FramedStream::new(stream);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = framed.read_frame() => match frame {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => {
                    debug!("connection closed");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "dropping connection");
                    return;
                }
            },
        };

        if frame.message_type != MessageType::Request {
            warn!(message_type = ?frame.message_type, "unexpected frame type; dropping connection");
            return;
        }

        let reply = match frame.decode::<RpcRequest>() {
            Ok(request) => {
                let response = handler(request).await;
                Frame::response(&response)
            }
            Err(e) => {
                let status = RpcStatus::new(
                    ErrorCode::InvalidArgument,
                    format!("malformed request: {e}"),
                );
                Frame::error(&status)
            }
        };

        let reply = match reply {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "error encoding response; dropping connection");
                return;
            }
        };

        if let Err(e) = framed.write_frame(&reply).await {
            debug!(error = %e, "error writing response; dropping connection");
            return;
        }
    }
}
