// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The default Stack handler: installs a Stack step by step and tears it down
//! again when the Stack is deleted.

pub mod crds;
pub mod personas;
pub mod rbac;
pub mod workload;

use crate::conditions::{available, creating, reconcile_error, reconcile_success, set_condition};
use crate::constants::timing::{REQUEUE_ON_ERROR_SECS, REQUEUE_ON_SUCCESS_SECS};
use crate::constants::FINALIZER;
use crate::error::{ApiContext, Result, StackError, StepContext};
use crate::kubernetes::ops::delete_labeled;
use crate::kubernetes::Clusters;
use crate::labels::{parent_labels, selector};
use crate::reconcilers::{HandlerFactory, StackHandler};
use crate::types::stack::{Stack, StackStatus};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, ResourceExt};
use personas::PersonaTable;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Creates a `StackInstaller` per reconcile, sharing one persona table
#[derive(Clone, Default)]
pub struct InstallerFactory {
    personas: Arc<PersonaTable>,
}

impl InstallerFactory {
    pub fn new(personas: PersonaTable) -> Self {
        Self {
            personas: Arc::new(personas),
        }
    }
}

impl HandlerFactory for InstallerFactory {
    fn handler(&self, stack: Stack, clusters: &Clusters) -> Box<dyn StackHandler> {
        Box::new(StackInstaller::new(stack, clusters.clone(), self.personas.clone()))
    }
}

pub struct StackInstaller {
    stack: Stack,
    clusters: Clusters,
    personas: Arc<PersonaTable>,
}

impl StackInstaller {
    pub fn new(stack: Stack, clusters: Clusters, personas: Arc<PersonaTable>) -> Self {
        Self {
            stack,
            clusters,
            personas,
        }
    }

    fn api(&self) -> Api<Stack> {
        Api::namespaced(
            self.clusters.tenant.clone(),
            &self.stack.namespace().unwrap_or_default(),
        )
    }

    fn status_mut(&mut self) -> &mut StackStatus {
        self.stack.status.get_or_insert_with(Default::default)
    }

    fn set_condition(&mut self, condition: crate::types::stack::Condition) {
        set_condition(&mut self.status_mut().conditions, condition);
    }

    async fn persist_status(&self) -> Result<()> {
        let patch = json!({ "status": self.stack.status });
        self.api()
            .patch_status(&self.stack.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context("failed to update stack status")?;
        Ok(())
    }

    /// Record the error on the Stack and retry after a fixed delay
    async fn fail(&mut self, err: StackError) -> Result<Action> {
        warn!("Stack {} failed: {}", self.stack.name_any(), err);
        self.set_condition(reconcile_error(&err));
        self.persist_status().await?;
        Ok(Action::requeue(Duration::from_secs(REQUEUE_ON_ERROR_SECS)))
    }

    async fn set_finalizers(&mut self, finalizers: Vec<String>) -> Result<()> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api()
            .patch(&self.stack.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .context("failed to patch stack finalizers")?;
        self.stack.metadata.finalizers = Some(finalizers);
        Ok(())
    }

    async fn ensure_finalizer(&mut self) -> Result<()> {
        if self.stack.has_finalizer(FINALIZER) {
            return Ok(());
        }
        let mut finalizers = self.stack.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        self.set_finalizers(finalizers).await?;
        debug!("Added finalizer to stack {}", self.stack.name_any());
        Ok(())
    }

    async fn remove_finalizer(&mut self) -> Result<()> {
        if !self.stack.has_finalizer(FINALIZER) {
            return Ok(());
        }
        let finalizers = self
            .stack
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        self.set_finalizers(finalizers).await?;
        info!("Removed finalizer from stack {}", self.stack.name_any());
        Ok(())
    }

    /// Every install step in order. The finalizer goes on first so a failure
    /// further down still gets cleaned up on deletion.
    async fn install(&mut self) -> Result<Option<ObjectReference>> {
        let tenant = self.clusters.tenant.clone();

        self.ensure_finalizer().await.step("failed to add finalizer")?;

        rbac::provision(&tenant, &self.stack)
            .await
            .step("failed to create RBAC permissions")?;

        let matched = crds::crds_for_stack(&tenant, &self.stack)
            .await
            .step("failed to process stack CRDs")?;
        crds::ensure_fulfilled(&self.stack.spec.crds, &matched)?;
        let labeled = crds::label_namespace(&tenant, &self.stack, &matched)
            .await
            .step("failed to label CRDs with namespace")?;
        crds::label_multi_parent(&tenant, &self.stack, &labeled)
            .await
            .step("failed to label CRDs with parent")?;
        personas::create_persona_roles(&tenant, &self.stack, &matched, &self.personas)
            .await
            .step("failed to create persona cluster roles")?;

        workload::install_controller(&self.clusters, &self.stack)
            .await
            .step("failed to create controller workload")
    }

    /// Delete everything labeled as belonging to this Stack, then let it go.
    /// Stops at the first failure with the finalizer still in place.
    #[instrument(skip(self), fields(stack = %self.stack.name_any(), namespace = ?self.stack.namespace()))]
    async fn teardown(&mut self) -> Result<()> {
        let labels = selector(&parent_labels(&self.stack));
        let namespace = self
            .clusters
            .controller_namespace(&self.stack.namespace().unwrap_or_default());
        let host = self.clusters.host.clone();
        let tenant = self.clusters.tenant.clone();

        let deployments: Api<Deployment> = Api::namespaced(host.clone(), &namespace);
        delete_labeled(&deployments, &labels, "failed to delete controller deployments").await?;

        let jobs: Api<Job> = Api::namespaced(host, &namespace);
        delete_labeled(&jobs, &labels, "failed to delete controller jobs").await?;

        let roles: Api<ClusterRole> = Api::all(tenant.clone());
        delete_labeled(&roles, &labels, "failed to delete stack cluster roles").await?;

        let bindings: Api<ClusterRoleBinding> = Api::all(tenant.clone());
        delete_labeled(&bindings, &labels, "failed to delete stack cluster role bindings").await?;

        crds::release(&tenant, &self.stack)
            .await
            .step("failed to remove stack labels from CRDs")?;

        self.remove_finalizer().await.step("failed to remove stack finalizer")
    }
}

#[async_trait]
impl StackHandler for StackInstaller {
    async fn create(&mut self) -> Result<Action> {
        self.set_condition(creating());

        match self.install().await {
            Ok(controller_ref) => {
                self.status_mut().controller_ref = controller_ref;
                self.set_condition(available());
                self.set_condition(reconcile_success());
                self.persist_status().await?;
                info!("Stack {} is available", self.stack.name_any());
                Ok(Action::requeue(Duration::from_secs(REQUEUE_ON_SUCCESS_SECS)))
            }
            Err(e) => self.fail(e).await,
        }
    }

    /// Changes to an installed Stack are not rolled out
    async fn update(&mut self) -> Result<Action> {
        Ok(Action::await_change())
    }

    async fn delete(&mut self) -> Result<Action> {
        match self.teardown().await {
            Ok(()) => Ok(Action::await_change()),
            Err(e) => self.fail(e).await,
        }
    }
}
