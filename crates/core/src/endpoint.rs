//! Network endpoints that make running services reachable.
//!
//! [`TcpExposer`] gives every service its own HTTP listener on an ephemeral
//! port. `GET /report` answers with the service's report text.

use crate::contract::VirtualService;
use crate::{Error, Result};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Live endpoint of one service.
///
/// Dropping the handle aborts the endpoint task.
#[derive(Debug)]
pub struct EndpointHandle {
    service: String,
    address: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EndpointHandle {
    pub fn new(
        service: impl Into<String>,
        address: Option<SocketAddr>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            service: service.into(),
            address,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// A handle with no background task behind it.
    pub fn detached(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            address: None,
            shutdown: None,
            task: None,
        }
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Signal the endpoint to stop and wait for it, at most `timeout`.
    ///
    /// On timeout the task is aborted and `Error::Timeout` returned.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::transport(
                &self.service,
                format!("endpoint task ended abnormally: {}", e),
            )),
            Err(_) => {
                task.abort();
                Err(Error::timeout(
                    format!("Closing endpoint of '{}'", self.service),
                    timeout,
                ))
            }
        }
    }
}

impl Drop for EndpointHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Transport that exposes a running service over the network.
#[async_trait]
pub trait EndpointExposer: Send + Sync {
    /// Make `service` reachable, failing with `Error::Transport` if it cannot listen.
    async fn open(
        &self,
        service: Arc<dyn VirtualService>,
        timeout: Duration,
    ) -> Result<EndpointHandle>;

    /// Close an endpoint. Must return within roughly `timeout`.
    async fn close(&self, handle: EndpointHandle, timeout: Duration) -> Result<()> {
        handle.shutdown(timeout).await
    }
}

/// Serves each service on its own HTTP listener.
#[derive(Debug, Clone)]
pub struct TcpExposer {
    bind_host: String,
    report_timeout: Duration,
}

impl TcpExposer {
    pub fn new(bind_host: impl Into<String>) -> Self {
        Self {
            bind_host: bind_host.into(),
            report_timeout: Duration::from_secs(10),
        }
    }

    /// Bound on a report call made on behalf of a remote client.
    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }
}

#[async_trait]
impl EndpointExposer for TcpExposer {
    async fn open(
        &self,
        service: Arc<dyn VirtualService>,
        timeout: Duration,
    ) -> Result<EndpointHandle> {
        let name = service.name().to_string();
        let bind_addr = format!("{}:0", self.bind_host);

        let listener = match tokio::time::timeout(timeout, TcpListener::bind(&bind_addr)).await {
            Ok(Ok(listener)) => listener,
            Ok(Err(e)) => {
                return Err(Error::transport(
                    &name,
                    format!("cannot listen on {}: {}", bind_addr, e),
                ))
            }
            Err(_) => {
                return Err(Error::timeout(
                    format!("Opening endpoint of '{}'", name),
                    timeout,
                ))
            }
        };

        let address = listener
            .local_addr()
            .map_err(|e| Error::transport(&name, e.to_string()))?;

        let app = router(service, self.report_timeout);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task_name = name.clone();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!("Endpoint of '{}' failed: {}", task_name, e);
            }
            tracing::debug!("Endpoint of '{}' closed", task_name);
        });

        tracing::info!("Service '{}' listening on http://{}", name, address);
        Ok(EndpointHandle::new(name, Some(address), shutdown_tx, task))
    }
}

#[derive(Clone)]
struct ReportState {
    service: Arc<dyn VirtualService>,
    timeout: Duration,
}

fn router(service: Arc<dyn VirtualService>, timeout: Duration) -> Router {
    Router::new()
        .route("/", get(report))
        .route("/report", get(report))
        .with_state(ReportState { service, timeout })
}

async fn report(State(state): State<ReportState>) -> impl IntoResponse {
    match tokio::time::timeout(state.timeout, state.service.report()).await {
        Ok(Ok(report)) => (StatusCode::OK, report),
        Ok(Err(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Report failed: {}", e),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Report failed: timed out".to_string(),
        ),
    }
}
