// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Deployment or Job running a Stack's own controller.
//!
//! In host-aware mode the workload runs in the host cluster but talks to the
//! tenant cluster: it is moved into the host controller namespace and its pods
//! get the tenant API endpoint plus a copy of the Stack's service account
//! token instead of the host cluster's in-cluster credentials.

use crate::config::{tenant_annotations, HostAwareConfig};
use crate::constants::host_aware::{
    ENV_POD_NAMESPACE, ENV_SERVICE_HOST, ENV_SERVICE_PORT, SA_MOUNT_PATH, SA_VOLUME_NAME,
};
use crate::constants::labels::APP;
use crate::error::{Result, StackError, StepContext};
use crate::kubernetes::ops::get_or_create;
use crate::kubernetes::Clusters;
use crate::labels::{controller_name, parent_labels};
use crate::sync::sync_token_secret;
use crate::types::stack::{Stack, WorkloadTemplate};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    EnvVar, ObjectReference, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::api::ObjectMeta;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub enum ControllerWorkload {
    Deployment(Deployment),
    Job(Job),
}

impl ControllerWorkload {
    /// Build the workload from the Stack's template with the stack manager's
    /// naming, labels, service account and selector forced onto it.
    pub fn prepare(stack: &Stack) -> Option<Self> {
        let name = controller_name(stack);
        let metadata = ObjectMeta {
            name: Some(name.clone()),
            namespace: stack.namespace(),
            labels: Some(parent_labels(stack)),
            ..Default::default()
        };
        let match_labels = BTreeMap::from([(APP.to_string(), name.clone())]);
        let selector = LabelSelector {
            match_labels: Some(match_labels.clone()),
            ..Default::default()
        };

        let mut workload = match stack.workload_template()? {
            WorkloadTemplate::Deployment(spec) => {
                let mut spec = spec.clone();
                spec.selector = selector;
                Self::Deployment(Deployment {
                    metadata,
                    spec: Some(spec),
                    status: None,
                })
            }
            WorkloadTemplate::Job(spec) => {
                let mut spec = spec.clone();
                spec.selector = Some(selector);
                spec.manual_selector = Some(true);
                Self::Job(Job {
                    metadata,
                    spec: Some(spec),
                    status: None,
                })
            }
        };

        let template = workload.pod_template_mut();
        let template_meta = template.metadata.get_or_insert_with(Default::default);
        template_meta.name = Some(name);
        template_meta
            .labels
            .get_or_insert_with(Default::default)
            .extend(match_labels);
        template
            .spec
            .get_or_insert_with(Default::default)
            .service_account_name = Some(stack.name_any());

        Some(workload)
    }

    fn pod_template_mut(&mut self) -> &mut PodTemplateSpec {
        match self {
            Self::Deployment(d) => &mut d.spec.get_or_insert_with(Default::default).template,
            Self::Job(j) => &mut j.spec.get_or_insert_with(Default::default).template,
        }
    }

    pub fn pod_spec(&self) -> Option<&PodSpec> {
        match self {
            Self::Deployment(d) => d.spec.as_ref()?.template.spec.as_ref(),
            Self::Job(j) => j.spec.as_ref()?.template.spec.as_ref(),
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Deployment(d) => &d.metadata,
            Self::Job(j) => &j.metadata,
        }
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Deployment(d) => &mut d.metadata,
            Self::Job(j) => &mut j.metadata,
        }
    }

    /// Relocate the workload into the host cluster.
    ///
    /// `token_secret` names the host copy of the Stack's service account token,
    /// mounted in place of the host cluster's own credentials.
    pub fn into_host_aware(
        mut self,
        stack: &Stack,
        host: Option<&HostAwareConfig>,
        token_secret: &str,
    ) -> Result<Self> {
        let host = host.ok_or(StackError::HostAwareDisabled)?;
        let stack_namespace = stack.namespace().unwrap_or_default();

        let spec = self.pod_template_mut().spec.get_or_insert_with(Default::default);
        rewrite_pod_spec(spec, host, &stack_namespace, token_secret);

        let meta = self.metadata_mut();
        let target = host.object_ref_on_host(
            meta.name.as_deref().unwrap_or_default(),
            meta.namespace.as_deref().unwrap_or_default(),
        );
        meta.name = Some(target.name);
        meta.namespace = Some(target.namespace);
        meta.annotations
            .get_or_insert_with(Default::default)
            .extend(tenant_annotations("stack", &stack.name_any(), &stack_namespace));

        Ok(self)
    }

    /// Fetch the workload, creating it when absent. An existing workload is
    /// returned unchanged.
    pub async fn get_or_create(&self, client: &Client) -> Result<Self> {
        let namespace = self.metadata().namespace.clone().unwrap_or_default();
        match self {
            Self::Deployment(d) => {
                let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
                get_or_create(&api, d, "failed to create controller deployment")
                    .await
                    .map(Self::Deployment)
            }
            Self::Job(j) => {
                let api: Api<Job> = Api::namespaced(client.clone(), &namespace);
                get_or_create(&api, j, "failed to create controller job")
                    .await
                    .map(Self::Job)
            }
        }
    }

    pub fn object_ref(&self) -> ObjectReference {
        match self {
            Self::Deployment(d) => d.object_ref(&()),
            Self::Job(j) => j.object_ref(&()),
        }
    }

    pub fn owner_ref(&self) -> Option<OwnerReference> {
        match self {
            Self::Deployment(d) => d.owner_ref(&()),
            Self::Job(j) => j.owner_ref(&()),
        }
    }
}

/// Point a pod at the tenant cluster using a mounted copy of the tenant token
pub fn rewrite_pod_spec(spec: &mut PodSpec, host: &HostAwareConfig, stack_namespace: &str, token_secret: &str) {
    spec.automount_service_account_token = Some(false);
    spec.service_account_name = None;
    spec.service_account = None;

    spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: SA_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(token_secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });

    for container in &mut spec.containers {
        container.env.get_or_insert_with(Vec::new).extend([
            env(ENV_SERVICE_HOST, &host.tenant_api_service_host),
            env(ENV_SERVICE_PORT, &host.tenant_api_service_port),
            // the pod's own namespace is the host namespace after relocation
            env(ENV_POD_NAMESPACE, stack_namespace),
        ]);
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .push(VolumeMount {
                name: SA_VOLUME_NAME.to_string(),
                mount_path: SA_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Create the Stack's controller workload and return a reference to it.
///
/// Returns `None` when the Stack declares no workload. In host-aware mode the
/// service account token is copied to the host once the workload exists, so
/// the copy can be owned by it.
#[instrument(skip_all, fields(stack = %stack.name_any(), namespace = ?stack.namespace()))]
pub async fn install_controller(clusters: &Clusters, stack: &Stack) -> Result<Option<ObjectReference>> {
    let Some(mut workload) = ControllerWorkload::prepare(stack) else {
        debug!("Stack declares no controller workload");
        return Ok(None);
    };

    let stack_name = stack.name_any();
    let stack_namespace = stack.namespace().unwrap_or_default();

    let token_target = match clusters.host_config.as_deref() {
        Some(host) => {
            let target = host.object_ref_on_host(&stack_name, &stack_namespace);
            workload = workload
                .into_host_aware(stack, Some(host), &target.name)
                .step("failed to prepare host aware workload")?;
            Some(target)
        }
        None => None,
    };

    let created = workload.get_or_create(&clusters.host).await?;

    if let Some(target) = token_target {
        let owner = created.owner_ref().ok_or_else(|| {
            StackError::MissingIdentity(format!("controller workload of stack {}", stack_name))
        })?;
        sync_token_secret(
            &clusters.tenant,
            &clusters.host,
            &stack_name,
            &stack_namespace,
            &target,
            owner,
        )
        .await
        .step("failed to sync service account token secret")?;
    }

    Ok(Some(created.object_ref()))
}
