// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::error::Result;
use crate::types::stack::Stack;
use kube::{discovery::Discovery, Client, Resource};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Wait for the Stack CRD to become available in the tenant cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_stack_crd(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;
    let api_version = Stack::api_version(&());

    loop {
        match check_stack_crd_exists(client).await {
            Ok(true) => {
                info!("Stack CRD ({}) is available", api_version);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "Stack CRD ({}) not yet available, waiting {} seconds...",
                    api_version, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for Stack CRD: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Check if the Stack CRD is served by discovering its group.
async fn check_stack_crd_exists(client: &Client) -> Result<bool> {
    let group = Stack::group(&());
    let discovery = Discovery::new(client.clone())
        .filter(&[group.as_ref()])
        .run()
        .await?;

    for g in discovery.groups() {
        if g.name() != group {
            continue;
        }
        for (ar, _) in g.recommended_resources() {
            if ar.kind == Stack::kind(&()) && ar.version == Stack::version(&()) {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
