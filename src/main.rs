// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stack_manager::config::Config;
use stack_manager::install::personas::PersonaTable;
use stack_manager::install::InstallerFactory;
use stack_manager::kubernetes::{connect, wait_for_stack_crd};
use stack_manager::reconcilers::StackReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("Starting stack manager");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: host_aware={}, tenant_kubeconfig={:?}",
        config.is_host_aware(),
        config.tenant_kubeconfig
    );

    let clusters = connect(&config).await?;
    info!("Connected to Kubernetes");

    // Wait for the Stack CRD before starting the reconciler
    info!("Waiting for Stack CRD to become available...");
    wait_for_stack_crd(&clusters.tenant).await?;

    let factory = Arc::new(InstallerFactory::new(PersonaTable::default()));
    StackReconciler::new(clusters, factory).run().await?;

    // The reconciler runs until its watch stream ends
    warn!("Stack reconciler stopped unexpectedly");
    Ok(())
}
