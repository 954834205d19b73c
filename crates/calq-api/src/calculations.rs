// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calculation API handlers.
//!
//! These translate between the RPC surface and the operation store: submit
//! mints an operation, persists it, and hands the job to the work queue; get
//! reads the record back and renders it as a long-running-operation view.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use calq_core::store::{Calculation, Datastore, FibonacciOfResult, StoreError};
use calq_core::workqueue::{FibonacciOfJob, JobQueue};
use calq_protocol::messages::{
    FibonacciOfRequest, FibonacciOfResponse, GetOperationRequest, Operation, OperationMetadata,
    OperationResult, RpcRequest, RpcResponse,
};

use crate::error::ApiError;
use crate::validation::validate_operation_name;

/// Shared state for the calculation handlers.
pub struct CalculationsState {
    datastore: Arc<dyn Datastore>,
    work_queue: Arc<dyn JobQueue>,
}

impl CalculationsState {
    pub fn new(datastore: Arc<dyn Datastore>, work_queue: Arc<dyn JobQueue>) -> Self {
        Self {
            datastore,
            work_queue,
        }
    }
}

/// Route a request envelope to its handler, rendering errors as status
/// responses.
pub async fn dispatch(state: &CalculationsState, request: RpcRequest) -> RpcResponse {
    let outcome = match request {
        RpcRequest::FibonacciOf(request) => handle_fibonacci_of(state, request).await,
        RpcRequest::GetOperation(request) => handle_get_operation(state, request).await,
    };

    match outcome {
        Ok(operation) => RpcResponse::Operation(operation),
        Err(error) => RpcResponse::Error(error.to_status()),
    }
}

/// Handle a calculation submission.
///
/// Mints an operation id, creates the store record, then publishes the job.
/// The inputs are deliberately not validated here: an invalid position flows
/// through and is recorded as a failed operation by the worker.
#[instrument(skip(state, request))]
pub async fn handle_fibonacci_of(
    state: &CalculationsState,
    request: FibonacciOfRequest,
) -> Result<Operation, ApiError> {
    let name = Uuid::new_v4().to_string();
    let created = Utc::now();
    let calculation = Calculation::new(name.clone(), created);

    match state.datastore.create(&calculation).await {
        Ok(()) => {}
        Err(StoreError::AlreadyExists { .. }) => {
            warn!(operation = %name, "tried to create calculation but it already exists");
            return Err(ApiError::AlreadyExists { name });
        }
        Err(error) => {
            error!(operation = %name, error = %error, "error creating calculation");
            return Err(ApiError::Internal);
        }
    }

    let job = FibonacciOfJob {
        operation_name: name.clone(),
        first: request.first,
        second: request.second,
        position: request.nth_position,
    };

    if let Err(error) = state.work_queue.publish(&job).await {
        // The record created above stays behind with done=false.
        error!(operation = %name, error = %error, "error publishing calculation job");
        return Err(ApiError::Internal);
    }

    Ok(Operation {
        name,
        metadata: OperationMetadata {
            created,
            started: None,
        },
        done: false,
        result: None,
    })
}

/// Handle an operation poll.
#[instrument(skip(state, request), fields(operation = %request.name))]
pub async fn handle_get_operation(
    state: &CalculationsState,
    request: GetOperationRequest,
) -> Result<Operation, ApiError> {
    validate_operation_name(&request.name)?;

    let calculation = match state.datastore.get(&request.name).await {
        Ok(calculation) => calculation,
        Err(StoreError::NotFound { .. }) => {
            return Err(ApiError::NotFound { name: request.name });
        }
        Err(error) => {
            error!(error = %error, "error getting calculation");
            return Err(ApiError::Internal);
        }
    };

    let mut operation = Operation {
        name: calculation.name,
        metadata: OperationMetadata {
            created: calculation.metadata.created,
            started: calculation.metadata.started,
        },
        done: calculation.done,
        result: None,
    };

    if let Some(status) = calculation.error {
        operation.result = Some(OperationResult::Error(status));
    } else if let Some(raw) = calculation.result {
        let result: FibonacciOfResult = serde_json::from_str(raw.get()).map_err(|error| {
            error!(error = %error, "error unmarshaling stored calculation result");
            ApiError::Internal
        })?;

        operation.result = Some(OperationResult::Response(FibonacciOfResponse {
            first: result.first,
            second: result.second,
            nth_position: result.position,
            result: result.result,
        }));
    }

    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use calq_core::workqueue::PublishError;
    use calq_protocol::messages::{ErrorCode, RpcStatus};
    use chrono::{DateTime, Utc};
    use serde_json::value::RawValue;
    use std::sync::Mutex;

    type GetFn = Box<dyn Fn(&str) -> Result<Calculation, StoreError> + Send + Sync>;

    #[derive(Default)]
    struct FakeStore {
        create_err: Option<fn(String) -> StoreError>,
        created: Mutex<Option<Calculation>>,
        get_fn: Option<GetFn>,
    }

    #[async_trait]
    impl Datastore for FakeStore {
        async fn create(&self, calculation: &Calculation) -> Result<(), StoreError> {
            if let Some(make_err) = self.create_err {
                return Err(make_err(calculation.name.clone()));
            }
            *self.created.lock().unwrap() = Some(calculation.clone());
            Ok(())
        }

        async fn get(&self, name: &str) -> Result<Calculation, StoreError> {
            match &self.get_fn {
                Some(get) => get(name),
                None => panic!("Get is unimplemented"),
            }
        }

        async fn save(&self, _calculation: &Calculation) -> Result<(), StoreError> {
            panic!("Save is unimplemented")
        }

        async fn set_started(
            &self,
            _name: &str,
            _started: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            panic!("SetStarted is unimplemented")
        }
    }

    #[derive(Default)]
    struct CapturingQueue {
        published: Mutex<Vec<FibonacciOfJob>>,
        fail: bool,
    }

    #[async_trait]
    impl JobQueue for CapturingQueue {
        async fn publish(&self, job: &FibonacciOfJob) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::ChannelUnavailable);
            }
            self.published.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    fn state_with(store: FakeStore, queue: CapturingQueue) -> (CalculationsState, Arc<FakeStore>, Arc<CapturingQueue>) {
        let store = Arc::new(store);
        let queue = Arc::new(queue);
        (
            CalculationsState::new(store.clone(), queue.clone()),
            store,
            queue,
        )
    }

    #[tokio::test]
    async fn test_submit_creates_record_and_publishes_matching_job() {
        let (state, store, queue) = state_with(FakeStore::default(), CapturingQueue::default());

        let request = FibonacciOfRequest {
            first: 1,
            second: 1,
            nth_position: 5,
        };
        let operation = handle_fibonacci_of(&state, request).await.unwrap();

        // The operation name is a freshly minted UUID.
        let operation_uuid = Uuid::parse_str(&operation.name).expect("name is a UUID");
        assert!(!operation.done);
        assert!(operation.result.is_none());

        let created = store.created.lock().unwrap().clone().expect("record created");
        assert_eq!(created.name, operation.name);
        assert!(!created.done);

        let published = queue.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let job = &published[0];
        assert_eq!(job.first, request.first);
        assert_eq!(job.second, request.second);
        assert_eq!(job.position, request.nth_position);

        // The job names the record the store created.
        let job_uuid = Uuid::parse_str(&job.operation_name).expect("job name is a UUID");
        assert_eq!(job_uuid, operation_uuid);
    }

    #[tokio::test]
    async fn test_submit_maps_already_exists() {
        let store = FakeStore {
            create_err: Some(|name| StoreError::AlreadyExists { name }),
            ..Default::default()
        };
        let (state, _, queue) = state_with(store, CapturingQueue::default());

        let err = handle_fibonacci_of(
            &state,
            FibonacciOfRequest {
                first: 0,
                second: 1,
                nth_position: 5,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        // Nothing was published for the failed submission.
        assert!(queue.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_maps_other_store_errors_to_internal() {
        let store = FakeStore {
            create_err: Some(|name| StoreError::UpdateUnsuccessful { name }),
            ..Default::default()
        };
        let (state, _, _) = state_with(store, CapturingQueue::default());

        let err = handle_fibonacci_of(
            &state,
            FibonacciOfRequest {
                first: 0,
                second: 1,
                nth_position: 5,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[tokio::test]
    async fn test_submit_publish_failure_is_internal_and_leaves_record() {
        let queue = CapturingQueue {
            fail: true,
            ..Default::default()
        };
        let (state, store, _) = state_with(FakeStore::default(), queue);

        let err = handle_fibonacci_of(
            &state,
            FibonacciOfRequest {
                first: 0,
                second: 1,
                nth_position: 5,
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
        // The record had already been created when the publish failed.
        assert!(store.created.lock().unwrap().is_some());
    }

    fn pending_calculation(name: &str) -> Calculation {
        Calculation::new(name, Utc::now())
    }

    #[tokio::test]
    async fn test_get_pending_operation_is_not_done() {
        let name = Uuid::new_v4().to_string();
        let store = FakeStore {
            get_fn: Some(Box::new(|name| Ok(pending_calculation(name)))),
            ..Default::default()
        };
        let (state, _, _) = state_with(store, CapturingQueue::default());

        let operation = handle_get_operation(
            &state,
            GetOperationRequest { name: name.clone() },
        )
        .await
        .unwrap();

        assert_eq!(operation.name, name);
        assert!(!operation.done);
        assert!(operation.result.is_none());
        assert!(operation.metadata.started.is_none());
    }

    #[tokio::test]
    async fn test_get_finished_operation_decodes_the_result() {
        let name = Uuid::new_v4().to_string();
        let store = FakeStore {
            get_fn: Some(Box::new(|name| {
                let mut calculation = pending_calculation(name);
                calculation.metadata.started = Some(Utc::now());
                calculation.done = true;
                calculation.result = Some(
                    RawValue::from_string(
                        serde_json::to_string(&FibonacciOfResult {
                            position: 6,
                            first: 0,
                            second: 1,
                            result: 5,
                        })
                        .unwrap(),
                    )
                    .unwrap(),
                );
                Ok(calculation)
            })),
            ..Default::default()
        };
        let (state, _, _) = state_with(store, CapturingQueue::default());

        let operation = handle_get_operation(&state, GetOperationRequest { name })
            .await
            .unwrap();

        assert!(operation.done);
        assert!(operation.metadata.started.is_some());
        match operation.result.expect("response arm set") {
            OperationResult::Response(response) => {
                assert_eq!(
                    response,
                    FibonacciOfResponse {
                        first: 0,
                        second: 1,
                        nth_position: 6,
                        result: 5,
                    }
                );
            }
            OperationResult::Error(status) => panic!("unexpected error arm: {status}"),
        }
    }

    #[tokio::test]
    async fn test_get_failed_operation_returns_the_error_arm() {
        let name = Uuid::new_v4().to_string();
        let store = FakeStore {
            get_fn: Some(Box::new(|name| {
                let mut calculation = pending_calculation(name);
                calculation.done = true;
                calculation.error = Some(RpcStatus::new(
                    ErrorCode::InvalidArgument,
                    "Fibonacci number sequences start at position 1",
                ));
                Ok(calculation)
            })),
            ..Default::default()
        };
        let (state, _, _) = state_with(store, CapturingQueue::default());

        let operation = handle_get_operation(&state, GetOperationRequest { name })
            .await
            .unwrap();

        assert!(operation.done);
        match operation.result.expect("error arm set") {
            OperationResult::Error(status) => {
                assert_eq!(status.code, ErrorCode::InvalidArgument);
            }
            OperationResult::Response(response) => {
                panic!("unexpected response arm: {response:?}")
            }
        }
    }

    #[tokio::test]
    async fn test_get_missing_operation_maps_not_found() {
        let store = FakeStore {
            get_fn: Some(Box::new(|name| {
                Err(StoreError::NotFound {
                    name: name.to_string(),
                })
            })),
            ..Default::default()
        };
        let (state, _, _) = state_with(store, CapturingQueue::default());

        let err = handle_get_operation(
            &state,
            GetOperationRequest {
                name: Uuid::new_v4().to_string(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_get_with_invalid_name_never_touches_the_store() {
        // The store panics on any access; validation must short-circuit.
        let (state, _, _) = state_with(FakeStore::default(), CapturingQueue::default());

        let err = handle_get_operation(
            &state,
            GetOperationRequest {
                name: "not-a-uuid".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_dispatch_renders_errors_as_status_responses() {
        let (state, _, _) = state_with(FakeStore::default(), CapturingQueue::default());

        let response = dispatch(
            &state,
            RpcRequest::GetOperation(GetOperationRequest {
                name: "not-a-uuid".to_string(),
            }),
        )
        .await;

        match response {
            RpcResponse::Error(status) => assert_eq!(status.code, ErrorCode::InvalidArgument),
            RpcResponse::Operation(operation) => panic!("unexpected operation: {operation:?}"),
        }
    }
}
