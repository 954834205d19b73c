// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client/server round trips over a localhost TCP connection.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use calq_protocol::client::{CalqClient, ClientError};
use calq_protocol::messages::{
    GetOperationRequest, Operation, OperationMetadata, RpcRequest, RpcResponse,
};
use calq_protocol::server::RpcServer;

async fn start_echo_server(cancel: CancellationToken) -> std::net::SocketAddr {
    let server = RpcServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind server");
    let addr = server.local_addr().expect("local addr");

    tokio::spawn(async move {
        let handler = |request: RpcRequest| async move {
            match request {
                RpcRequest::GetOperation(get) => RpcResponse::Operation(Operation {
                    name: get.name,
                    metadata: OperationMetadata {
                        created: Utc::now(),
                        started: None,
                    },
                    done: false,
                    result: None,
                }),
                RpcRequest::FibonacciOf(_) => RpcResponse::Operation(Operation {
                    name: "fixed".to_string(),
                    metadata: OperationMetadata {
                        created: Utc::now(),
                        started: None,
                    },
                    done: false,
                    result: None,
                }),
            }
        };
        let _ = server.run(cancel, handler).await;
    });

    addr
}

#[tokio::test]
async fn test_request_response_round_trip() {
    let cancel = CancellationToken::new();
    let addr = start_echo_server(cancel.clone()).await;

    let mut client = CalqClient::connect(addr).await.expect("connect");

    let response = client
        .request(&RpcRequest::GetOperation(GetOperationRequest {
            name: "my-operation".to_string(),
        }))
        .await
        .expect("request");

    match response {
        RpcResponse::Operation(operation) => {
            assert_eq!(operation.name, "my-operation");
            assert!(!operation.done);
            assert!(operation.result.is_none());
        }
        RpcResponse::Error(status) => panic!("unexpected error response: {status}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_connection_survives_multiple_requests() {
    let cancel = CancellationToken::new();
    let addr = start_echo_server(cancel.clone()).await;

    let mut client = CalqClient::connect(addr).await.expect("connect");

    for i in 0..3 {
        let name = format!("operation-{i}");
        let response = client
            .request(&RpcRequest::GetOperation(GetOperationRequest {
                name: name.clone(),
            }))
            .await
            .expect("request");
        match response {
            RpcResponse::Operation(operation) => assert_eq!(operation.name, name),
            RpcResponse::Error(status) => panic!("unexpected error response: {status}"),
        }
    }

    cancel.cancel();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    // Bind and immediately drop a listener to find a port that is closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = CalqClient::connect(addr).await;
    assert!(matches!(result, Err(ClientError::Connect(_))));
}
