// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tenant and host cluster client creation

use crate::config::{Config, HostAwareConfig};
use crate::error::{Result, StackError};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Clients for the cluster holding the Stacks (tenant) and the cluster running
/// their controllers (host). Both point at the same cluster unless the
/// operator runs host-aware.
#[derive(Clone)]
pub struct Clusters {
    pub tenant: Client,
    pub host: Client,
    pub host_config: Option<Arc<HostAwareConfig>>,
}

impl Clusters {
    pub fn single(client: Client) -> Self {
        Self {
            tenant: client.clone(),
            host: client,
            host_config: None,
        }
    }

    pub fn host_aware(tenant: Client, host: Client, host_config: HostAwareConfig) -> Self {
        Self {
            tenant,
            host,
            host_config: Some(Arc::new(host_config)),
        }
    }

    /// Namespace holding the controller workload of a Stack installed in `stack_namespace`
    pub fn controller_namespace(&self, stack_namespace: &str) -> String {
        match &self.host_config {
            Some(h) => h.host_controller_namespace.clone(),
            None => stack_namespace.to_string(),
        }
    }
}

/// Connect to the tenant cluster and, in host-aware mode, to the host cluster
#[instrument(skip(config))]
pub async fn connect(config: &Config) -> Result<Clusters> {
    let tenant_config = tenant_kube_config(config).await?;
    let tenant_url = tenant_config.cluster_url.to_string();
    let tenant = Client::try_from(tenant_config)
        .map_err(|e| StackError::KubeconfigError(format!("Failed to create client: {}", e)))?;

    let Some(host_namespace) = config.host_controller_namespace.as_deref() else {
        info!("Running single-cluster against {}", tenant_url);
        return Ok(Clusters::single(tenant));
    };

    let host_config = HostAwareConfig::new(host_namespace, &tenant_url)?;
    let host = Client::try_default().await.map_err(|e| {
        StackError::KubeconfigError(format!("Failed to create host cluster client: {}", e))
    })?;

    info!(
        "Running host-aware: tenant {}:{}, host controller namespace {}",
        host_config.tenant_api_service_host,
        host_config.tenant_api_service_port,
        host_config.host_controller_namespace
    );

    Ok(Clusters::host_aware(tenant, host, host_config))
}

async fn tenant_kube_config(config: &Config) -> Result<KConfig> {
    match &config.tenant_kubeconfig {
        Some(path) => config_from_kubeconfig_file(path).await,
        None => KConfig::infer()
            .await
            .map_err(|e| StackError::KubeconfigError(format!("Failed to infer config: {}", e))),
    }
}

/// Build a client config from a kubeconfig file on disk
async fn config_from_kubeconfig_file(path: &Path) -> Result<KConfig> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        StackError::KubeconfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let kubeconfig: Kubeconfig = serde_yaml::from_str(&raw)
        .map_err(|e| StackError::KubeconfigError(format!("Failed to parse kubeconfig: {}", e)))?;

    KConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| StackError::KubeconfigError(format!("Failed to create config: {}", e)))
}
