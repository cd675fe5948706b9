// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GatewaySdk client for interacting with podgate-gateway.

use std::time::Duration;

use tracing::{debug, info, instrument};

use podgate_protocol::gateway_proto::{
    CreateWorkloadRequest, HealthCheckRequest, HelloRequest, RpcRequest, RpcResponse,
    rpc_request::Request, rpc_response::Response,
};
use podgate_protocol::{PodgateClient, PodgateClientConfig};

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::types::{CreateWorkloadOptions, HealthStatus, WorkloadOutcome};

/// High-level SDK for submitting workloads to podgate-gateway.
///
/// Wraps the QUIC protocol. One connection is shared by all calls; each call
/// uses its own stream.
pub struct GatewaySdk {
    client: PodgateClient,
    config: SdkConfig,
}

impl GatewaySdk {
    /// Create a new SDK with the given configuration.
    pub fn new(config: SdkConfig) -> Result<Self> {
        let client_config = PodgateClientConfig {
            server_addr: config.server_addr,
            server_name: config.server_name.clone(),
            dangerous_skip_cert_verification: config.skip_cert_verification,
            ca_pem: config.ca_cert_pem.clone(),
            keep_alive: Some(Duration::from_secs(10)),
            idle_timeout: config.request_timeout.max(Duration::from_secs(30)),
            connect_timeout: config.connect_timeout,
        };

        let client = PodgateClient::new(client_config)?;

        Ok(Self { client, config })
    }

    /// Create an SDK from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = SdkConfig::from_env()?;
        Self::new(config)
    }

    /// Create an SDK for localhost development.
    pub fn localhost() -> Result<Self> {
        Self::new(SdkConfig::localhost())
    }

    /// Connect to podgate-gateway.
    #[instrument(skip(self), fields(addr = %self.config.server_addr))]
    pub async fn connect(&self) -> Result<()> {
        self.client.connect().await?;
        info!("Connected to podgate-gateway");
        Ok(())
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.client.close().await;
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    /// Get the SDK configuration.
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Send a request and receive a response.
    async fn send_request(&self, request: Request) -> Result<Response> {
        let rpc_request = RpcRequest {
            request: Some(request),
        };

        let timeout = self.config.request_timeout;
        let rpc_response: RpcResponse =
            tokio::time::timeout(timeout, self.client.request(&rpc_request))
                .await
                .map_err(|_| SdkError::Timeout(timeout.as_millis() as u64))??;

        match rpc_response.response {
            Some(Response::Error(err)) => Err(SdkError::Server {
                code: err.code,
                message: err.message,
            }),
            Some(response) => Ok(response),
            None => Err(SdkError::UnexpectedResponse(
                "empty response from server".to_string(),
            )),
        }
    }

    /// Check health of podgate-gateway.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<HealthStatus> {
        debug!("Performing health check");

        match self
            .send_request(Request::HealthCheck(HealthCheckRequest {}))
            .await?
        {
            Response::HealthCheck(resp) => Ok(HealthStatus {
                healthy: resp.healthy,
                version: resp.version,
                uptime_ms: resp.uptime_ms,
                control_plane: resp.control_plane,
            }),
            _ => Err(SdkError::UnexpectedResponse(
                "expected HealthCheckResponse".to_string(),
            )),
        }
    }

    /// Send a greeting and return the gateway's reply.
    #[instrument(skip(self))]
    pub async fn hello(&self, name: &str) -> Result<String> {
        match self
            .send_request(Request::Hello(HelloRequest {
                name: name.to_string(),
            }))
            .await?
        {
            Response::Hello(resp) => Ok(resp.message),
            _ => Err(SdkError::UnexpectedResponse(
                "expected HelloResponse".to_string(),
            )),
        }
    }

    /// Submit a workload for admission.
    ///
    /// Admission failures come back as an outcome with `success == false`;
    /// only transport and protocol problems are errors.
    #[instrument(skip(self, options), fields(namespace = ?options.namespace))]
    pub async fn create_workload(&self, options: CreateWorkloadOptions) -> Result<WorkloadOutcome> {
        if options.document.trim().is_empty() {
            return Err(SdkError::InvalidInput("document is empty".to_string()));
        }
        debug!(bytes = options.document.len(), "Submitting workload");

        let request = CreateWorkloadRequest {
            document: options.document,
            namespace: options.namespace.unwrap_or_default(),
            idempotency_token: options.idempotency_token,
            timeout_ms: options.timeout.map(|t| t.as_millis() as u64),
        };

        match self
            .send_request(Request::CreateWorkload(request))
            .await?
        {
            Response::CreateWorkload(resp) => {
                let outcome = WorkloadOutcome::from(resp);
                debug!(outcome = ?outcome.outcome, "Workload submitted");
                Ok(outcome)
            }
            _ => Err(SdkError::UnexpectedResponse(
                "expected CreateWorkloadResponse".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_document_is_rejected_locally() {
        let sdk = GatewaySdk::localhost().unwrap();
        let err = sdk
            .create_workload(CreateWorkloadOptions::new("  \n"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::InvalidInput(_)));
        assert!(!sdk.is_connected().await);
    }
}
