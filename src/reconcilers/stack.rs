// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Stack reconciler - routes every Stack event to create, update or delete.

use crate::constants::timing::{RECONCILE_TIMEOUT_SECS, REQUEUE_ON_ERROR_SECS};
use crate::error::{ApiContext, Result, StackError};
use crate::kubernetes::Clusters;
use crate::types::stack::Stack;
use async_trait::async_trait;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, Controller},
    Api, ResourceExt,
};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// The lifecycle operations run for a single Stack
#[async_trait]
pub trait StackHandler: Send {
    /// Install everything the Stack needs. Runs until the Stack has a controller reference.
    async fn create(&mut self) -> Result<Action>;
    async fn update(&mut self) -> Result<Action>;
    /// Tear down what `create` installed and release the finalizer.
    async fn delete(&mut self) -> Result<Action>;
}

/// Builds the handler for a freshly read Stack
pub trait HandlerFactory: Send + Sync {
    fn handler(&self, stack: Stack, clusters: &Clusters) -> Box<dyn StackHandler>;
}

pub struct StackReconciler {
    clusters: Clusters,
    factory: Arc<dyn HandlerFactory>,
    timeout: Duration,
}

impl StackReconciler {
    pub fn new(clusters: Clusters, factory: Arc<dyn HandlerFactory>) -> Self {
        Self {
            clusters,
            factory,
            timeout: Duration::from_secs(RECONCILE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let stacks: Api<Stack> = Api::all(self.clusters.tenant.clone());
        let context = Arc::new(self);

        info!("Watching Stacks");
        Controller::new(stacks, watcher::Config::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled stack: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Re-read the Stack and run the operation its current state calls for
    #[instrument(skip(self))]
    pub async fn dispatch(&self, namespace: &str, name: &str) -> Result<Action> {
        let api: Api<Stack> = Api::namespaced(self.clusters.tenant.clone(), namespace);
        let Some(stack) = api.get_opt(name).await.context("failed to get stack")? else {
            debug!("Stack is gone, nothing to do");
            return Ok(Action::await_change());
        };

        let deleting = stack.is_being_deleted();
        let created = stack.controller_ref().is_some();
        let mut handler = self.factory.handler(stack, &self.clusters);

        if deleting {
            debug!("Stack is being deleted");
            handler.delete().await
        } else if !created {
            debug!("Stack has no controller yet, creating");
            handler.create().await
        } else {
            handler.update().await
        }
    }
}

async fn reconcile(stack: Arc<Stack>, ctx: Arc<StackReconciler>) -> Result<Action> {
    let namespace = stack.namespace().unwrap_or_default();
    let name = stack.name_any();

    match tokio::time::timeout(ctx.timeout, ctx.dispatch(&namespace, &name)).await {
        Ok(result) => result,
        Err(_) => Err(StackError::Timeout(ctx.timeout)),
    }
}

fn error_policy(stack: Arc<Stack>, error: &StackError, _ctx: Arc<StackReconciler>) -> Action {
    error!(
        "Reconciliation of stack {}/{} failed: {}",
        stack.namespace().unwrap_or_default(),
        stack.name_any(),
        error
    );
    Action::requeue(Duration::from_secs(REQUEUE_ON_ERROR_SECS))
}
