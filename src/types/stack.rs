// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{Result, StackError};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// A packaged extension installed into the cluster: the CRDs it provides, the
/// permissions its controller needs and the controller workload itself.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "stacks.geeko.me", version = "v1alpha1", kind = "Stack")]
#[kube(namespaced, shortname = "stk")]
#[kube(status = "StackStatus")]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// CRDs the Stack expects to be registered
    #[serde(default)]
    pub crds: Vec<CrdDescriptor>,
    #[serde(default)]
    pub permissions: PermissionsSpec,
    /// `Namespaced` (default) or `Cluster`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_scope: Option<String>,
    #[serde(default)]
    pub controller: ControllerSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CrdDescriptor {
    pub api_version: String,
    pub kind: String,
}

impl CrdDescriptor {
    pub fn new(api_version: &str, kind: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((_, version)) => version,
            None => &self.api_version,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsSpec {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<ControllerDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<ControllerJob>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDeployment {
    pub spec: DeploymentSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControllerJob {
    pub spec: JobSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// The workload running this Stack's controller, set once it is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_ref: Option<ObjectReference>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScope {
    Namespaced,
    Cluster,
}

/// The controller workload template a Stack declares
#[derive(Debug, Clone, Copy)]
pub enum WorkloadTemplate<'a> {
    Deployment(&'a DeploymentSpec),
    Job(&'a JobSpec),
}

impl Stack {
    pub fn permission_scope(&self) -> Result<PermissionScope> {
        match self.spec.permission_scope.as_deref() {
            None | Some("") | Some("Namespaced") => Ok(PermissionScope::Namespaced),
            Some("Cluster") => Ok(PermissionScope::Cluster),
            Some(other) => Err(StackError::InvalidPermissionScope(other.to_string())),
        }
    }

    pub fn workload_template(&self) -> Option<WorkloadTemplate<'_>> {
        let controller = &self.spec.controller;
        match (&controller.deployment, &controller.job) {
            (Some(d), Some(_)) => {
                warn!("Stack declares both a controller deployment and job, using the deployment");
                Some(WorkloadTemplate::Deployment(&d.spec))
            }
            (Some(d), None) => Some(WorkloadTemplate::Deployment(&d.spec)),
            (None, Some(j)) => Some(WorkloadTemplate::Job(&j.spec)),
            (None, None) => None,
        }
    }

    pub fn service_account_annotations(&self) -> Option<BTreeMap<String, String>> {
        self.spec
            .controller
            .service_account
            .as_ref()
            .and_then(|sa| sa.annotations.clone())
    }

    pub fn controller_ref(&self) -> Option<&ObjectReference> {
        self.status.as_ref().and_then(|s| s.controller_ref.as_ref())
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }
}
