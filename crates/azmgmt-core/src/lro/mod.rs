//! Long-running operation polling
//!
//! Mutating Resource Manager calls may answer before the work is done. The
//! triggering response tells the client where to look for progress:
//!
//! 1. `Azure-AsyncOperation` header: an operation resource with a `status`
//! 2. `Location` header: `202` while running, `200`/`204` when done
//! 3. for PUT/PATCH without either header, the resource itself, whose
//!    `properties.provisioningState` is polled
//!
//! A [`Poller`] is created by [`Pipeline::begin_long_running_operation`] and
//! can be polled one step at a time with [`Poller::poll_once`], waited on with
//! [`Poller::wait`] or handed to a background task with [`Poller::spawn`].
//! Dropping a poller (or the future of `wait`) stops polling.

mod progress;
mod status;

pub use progress::{LroCallback, LroEvent};
pub use status::{OperationState, OperationStatus};

use crate::config::PollingConfig;
use crate::error::{CloudError, Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::Pipeline;
use progress::emit;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use status::{error_from_body, state_from_body};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Where status checks go
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollTarget {
    AsyncOperation(Url),
    Location(Url),
    Resource(Url),
    /// The triggering response was already terminal
    Done,
}

impl PollTarget {
    fn url(&self) -> Option<&Url> {
        match self {
            Self::AsyncOperation(url) | Self::Location(url) | Self::Resource(url) => Some(url),
            Self::Done => None,
        }
    }
}

fn header_url(response: &Response, name: &str, base: &Url) -> Result<Option<Url>> {
    match response.header(name).map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => base.join(value).map(Some).map_err(|e| {
            Error::Contract(format!("invalid {} header '{}': {}", name, value, e))
        }),
    }
}

fn non_null(value: Value) -> Option<Value> {
    (!value.is_null()).then_some(value)
}

/// Status check responses worth asking again: 408, 429 and 5xx
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Tracks one long-running operation
pub struct Poller {
    pipeline: Pipeline,
    method: Method,
    resource_url: Url,
    target: PollTarget,
    /// `Location` sent alongside `Azure-AsyncOperation`; holds a POST result
    final_location: Option<Url>,
    status: OperationStatus,
    logging_context: Option<String>,
    config: PollingConfig,
    on_progress: Option<LroCallback>,
    started: Instant,
    polls: u32,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("method", &self.method)
            .field("resource_url", &self.resource_url.as_str())
            .field("target", &self.target)
            .field("status", &self.status)
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Send the triggering request and work out how to follow it
    pub async fn start(pipeline: Pipeline, request: Request) -> Result<Self> {
        let method = request.method.clone();
        let resource_url = request.url.clone();
        let logging_context = request.logging_context.clone();

        let response = pipeline.send(request).await?;
        let code = response.status.as_u16();
        if !matches!(code, 200 | 201 | 202 | 204) {
            return Err(Error::Contract(format!(
                "unexpected status {} for long-running {} {}",
                code, method, resource_url
            )));
        }

        let async_operation = header_url(&response, "azure-asyncoperation", &resource_url)?;
        let location = header_url(&response, "location", &resource_url)?;
        let retry_after = response.retry_after_secs().map(Duration::from_secs);
        let body = response.json_value()?;

        let (target, mut status, final_location) = if let Some(url) = async_operation {
            (
                PollTarget::AsyncOperation(url),
                OperationStatus::new(OperationState::Started),
                location,
            )
        } else if let Some(url) = location.filter(|_| matches!(code, 201 | 202)) {
            (
                PollTarget::Location(url),
                OperationStatus::new(OperationState::Started),
                None,
            )
        } else if code == 202 {
            return Err(Error::Contract(format!(
                "202 for {} {} without a status URL",
                method, resource_url
            )));
        } else {
            let status = match state_from_body(&body) {
                None | Some(OperationState::Succeeded) => OperationStatus::succeeded(non_null(body)),
                Some(state @ (OperationState::Failed | OperationState::Canceled)) => {
                    OperationStatus {
                        error: error_from_body(&body),
                        ..OperationStatus::new(state)
                    }
                }
                Some(_) if matches!(method, Method::PUT | Method::PATCH) => {
                    let target = PollTarget::Resource(resource_url.clone());
                    return Ok(Self::new(
                        pipeline,
                        method,
                        resource_url,
                        target,
                        None,
                        OperationStatus {
                            retry_after,
                            ..OperationStatus::new(OperationState::Started)
                        },
                        logging_context,
                    ));
                }
                Some(_) => {
                    return Err(Error::Contract(format!(
                        "{} {} is in progress but gave no status URL",
                        method, resource_url
                    )));
                }
            };
            (PollTarget::Done, status, None)
        };
        status.retry_after = retry_after;

        debug!(
            "Long-running {} {} accepted, following {:?}",
            method, resource_url, target
        );
        Ok(Self::new(
            pipeline,
            method,
            resource_url,
            target,
            final_location,
            status,
            logging_context,
        ))
    }

    fn new(
        pipeline: Pipeline,
        method: Method,
        resource_url: Url,
        target: PollTarget,
        final_location: Option<Url>,
        status: OperationStatus,
        logging_context: Option<String>,
    ) -> Self {
        let config = pipeline.config().polling.clone();
        Self {
            pipeline,
            method,
            resource_url,
            target,
            final_location,
            status,
            logging_context,
            config,
            on_progress: None,
            started: Instant::now(),
            polls: 0,
        }
    }

    /// Report progress through `callback`
    pub fn with_progress(mut self, callback: LroCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Override the polling configuration taken from the pipeline
    pub fn with_polling_config(mut self, config: PollingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn status(&self) -> &OperationStatus {
        &self.status
    }

    pub fn state(&self) -> OperationState {
        self.status.state
    }

    pub fn is_done(&self) -> bool {
        self.status.state.is_terminal()
    }

    /// Number of status checks made so far
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// URL status checks are sent to, if the operation is still running
    pub fn operation_url(&self) -> Option<&Url> {
        self.target.url()
    }

    /// Delay before the next status check
    pub fn next_delay(&self) -> Duration {
        self.status
            .retry_after
            .unwrap_or(Duration::from_secs(self.config.default_interval_secs))
    }

    fn request(&self, url: &Url) -> Request {
        let mut request = Request::get(url.clone());
        request.logging_context = self.logging_context.clone();
        request
    }

    fn fail(&mut self, error: Option<CloudError>) -> Error {
        self.status.state = OperationState::Failed;
        self.status.error = error.clone();
        emit(
            &self.on_progress,
            LroEvent::Failed {
                state: OperationState::Failed,
                error: describe(&error),
            },
        );
        Error::OperationFailed { error }
    }

    /// GET the status URL, repeating transient failures up to
    /// `max_poll_failures` times
    async fn fetch_status(&mut self, url: &Url) -> Result<Response> {
        let mut failures = 0;
        loop {
            let mut retry_after = None;
            let error = match self.pipeline.execute(self.request(url)).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if is_transient_status(response.status) => {
                    retry_after = response.retry_after_secs().map(Duration::from_secs);
                    Error::Http {
                        status: response.status.as_u16(),
                        error: response.decoded_error(),
                        body: response.text(),
                    }
                }
                Ok(response) => {
                    let error = response.decoded_error().unwrap_or_else(|| {
                        CloudError::new(
                            response.status.as_str(),
                            format!("status check returned {}", response.status),
                        )
                    });
                    return Err(self.fail(Some(error)));
                }
                Err(e @ (Error::Transport(_) | Error::Connectivity { .. })) => e,
                Err(e) => return Err(e),
            };

            failures += 1;
            if failures > self.config.max_poll_failures {
                let cloud_error = error
                    .cloud_error()
                    .cloned()
                    .unwrap_or_else(|| CloudError::new("PollFailed", error.to_string()));
                return Err(self.fail(Some(cloud_error)));
            }
            warn!(
                "Status check for {} failed ({}/{}): {}",
                url, failures, self.config.max_poll_failures, error
            );
            emit(
                &self.on_progress,
                LroEvent::PollRetry {
                    failures,
                    error: error.to_string(),
                },
            );
            tokio::time::sleep(retry_after.unwrap_or_else(|| self.next_delay())).await;
        }
    }

    /// Result of a Succeeded operation, fetched from wherever it lives
    async fn final_result(&self, operation_body: &Value) -> Result<Option<Value>> {
        match self.method {
            Method::PUT | Method::PATCH => {
                let response = self.pipeline.send(self.request(&self.resource_url)).await?;
                Ok(non_null(response.json_value()?))
            }
            Method::POST => match &self.final_location {
                Some(location) => {
                    let response = self.pipeline.send(self.request(location)).await?;
                    Ok(non_null(response.json_value()?))
                }
                None => Ok(operation_body.get("properties").cloned()),
            },
            _ => Ok(None),
        }
    }

    /// Make one status check unless the operation is already terminal
    pub async fn poll_once(&mut self) -> Result<&OperationStatus> {
        if self.status.state.is_terminal() {
            return Ok(&self.status);
        }
        let target = self.target.clone();
        let Some(url) = target.url() else {
            return Err(Error::Contract(
                "operation is not terminal but has no status URL".to_string(),
            ));
        };

        let response = self.fetch_status(url).await?;
        self.polls += 1;
        self.status.retry_after = response.retry_after_secs().map(Duration::from_secs);

        match &target {
            PollTarget::AsyncOperation(_) => {
                let body = response.json_value()?;
                let state = state_from_body(&body).ok_or_else(|| {
                    Error::Contract(format!("operation status at {} has no status field", url))
                })?;
                match state {
                    OperationState::Succeeded => {
                        self.status.result = self.final_result(&body).await?;
                    }
                    OperationState::Failed | OperationState::Canceled => {
                        self.status.error = error_from_body(&body);
                    }
                    _ => {}
                }
                self.status.state = state;
            }
            PollTarget::Location(_) => {
                if response.status.as_u16() == 202 {
                    self.status.state = OperationState::InProgress;
                } else {
                    self.status.result = non_null(response.json_value()?);
                    self.status.state = OperationState::Succeeded;
                }
            }
            PollTarget::Resource(_) => {
                let body = response.json_value()?;
                let state = state_from_body(&body).unwrap_or(OperationState::Succeeded);
                match state {
                    OperationState::Succeeded => self.status.result = non_null(body),
                    OperationState::Failed | OperationState::Canceled => {
                        self.status.error = error_from_body(&body);
                    }
                    _ => {}
                }
                self.status.state = state;
            }
            PollTarget::Done => {}
        }

        let elapsed = self.started.elapsed();
        debug!(
            "{} {} is {} after {} polls",
            self.method, self.resource_url, self.status.state, self.polls
        );
        emit(
            &self.on_progress,
            LroEvent::Polling {
                state: self.status.state,
                elapsed,
                next_poll_in: (!self.status.state.is_terminal()).then(|| self.next_delay()),
            },
        );
        match self.status.state {
            OperationState::Succeeded => emit(&self.on_progress, LroEvent::Completed { elapsed }),
            state @ (OperationState::Failed | OperationState::Canceled) => emit(
                &self.on_progress,
                LroEvent::Failed {
                    state,
                    error: describe(&self.status.error),
                },
            ),
            _ => {}
        }
        Ok(&self.status)
    }

    /// Poll until the operation is terminal and return its result.
    ///
    /// Failed and Canceled operations become [`Error::OperationFailed`] and
    /// [`Error::OperationCanceled`] carrying the service's error payload.
    pub async fn wait(mut self) -> Result<Option<Value>> {
        emit(
            &self.on_progress,
            LroEvent::Started {
                operation_url: self.target.url().map(Url::to_string),
            },
        );
        let timeout = self.config.timeout_secs.map(Duration::from_secs);
        loop {
            match self.status.state {
                OperationState::Succeeded => return Ok(self.status.result.take()),
                OperationState::Failed => {
                    return Err(Error::OperationFailed {
                        error: self.status.error.take(),
                    });
                }
                OperationState::Canceled => {
                    return Err(Error::OperationCanceled {
                        error: self.status.error.take(),
                    });
                }
                OperationState::Started | OperationState::InProgress => {}
            }

            let mut delay = self.next_delay();
            if let Some(timeout) = timeout {
                let elapsed = self.started.elapsed();
                if elapsed >= timeout {
                    return Err(Error::PollTimeout(timeout));
                }
                delay = delay.min(timeout - elapsed);
            }
            tokio::time::sleep(delay).await;
            self.poll_once().await?;
        }
    }

    /// [`wait`](Self::wait) and deserialize the result
    pub async fn wait_for<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.wait().await?.ok_or_else(|| {
            Error::Contract("operation completed without a result".to_string())
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// [`wait`](Self::wait) until done or until `cancel` resolves, whichever
    /// comes first. Cancelling stops polling; the remote operation continues.
    pub async fn wait_or_cancel<F>(self, cancel: F) -> Result<Option<Value>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.wait() => result,
            _ = cancel => {
                debug!("Stopped waiting for long-running operation");
                Err(Error::Cancelled)
            }
        }
    }

    /// Poll on a background task
    pub fn spawn(self) -> OperationHandle {
        OperationHandle {
            handle: tokio::spawn(self.wait()),
        }
    }
}

fn describe(error: &Option<CloudError>) -> String {
    error
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no error details".to_string())
}

/// A long-running operation polled on a background task
#[derive(Debug)]
pub struct OperationHandle {
    handle: JoinHandle<Result<Option<Value>>>,
}

impl OperationHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop polling. [`result`](Self::result) then yields [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub async fn result(self) -> Result<Option<Value>> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::Contract(format!("polling task panicked: {}", e))),
        }
    }
}
