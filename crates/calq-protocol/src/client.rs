// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! TCP client for the calculation RPC surface.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpStream;

use crate::frame::{Frame, FrameError, FramedStream, MessageType};
use crate::messages::{RpcRequest, RpcResponse, RpcStatus};

/// Errors that can occur on the client side of an RPC exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect error: {0}")]
    Connect(#[source] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("server rejected the request: {0}")]
    Rpc(RpcStatus),

    #[error("unexpected frame type: {0:?}")]
    UnexpectedFrame(MessageType),
}

/// A connected client holding one TCP stream.
///
/// Requests are issued sequentially; the connection can be reused for any
/// number of request/response exchanges.
pub struct CalqClient {
    stream: FramedStream<TcpStream>,
}

impl CalqClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        Ok(Self {
            stream: FramedStream::new(stream),
        })
    }

    /// Send a request and wait for the response.
    pub async fn request(&mut self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let frame = Frame::request(request)?;
        self.stream.write_frame(&frame).await?;

        let reply = self.stream.read_frame().await?;
        match reply.message_type {
            MessageType::Response => Ok(reply.decode()?),
            MessageType::Error => {
                let status: RpcStatus = reply.decode()?;
                Err(ClientError::Rpc(status))
            }
            other => Err(ClientError::UnexpectedFrame(other)),
        }
    }
}
