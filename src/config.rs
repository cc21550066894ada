// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{annotations, names};
use crate::error::{Result, StackError};
use crate::labels::truncate;
use anyhow::Context;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use url::Url;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Namespace on the host cluster that receives relocated controllers.
    /// Host-aware mode is enabled when this is set.
    pub host_controller_namespace: Option<String>,
    /// Kubeconfig for the tenant cluster; inferred when absent
    pub tenant_kubeconfig: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let host_controller_namespace = non_empty_var("HOST_CONTROLLER_NAMESPACE")?;
        let tenant_kubeconfig = non_empty_var("TENANT_KUBECONFIG")?.map(PathBuf::from);

        Ok(Config {
            host_controller_namespace,
            tenant_kubeconfig,
        })
    }

    pub fn is_host_aware(&self) -> bool {
        self.host_controller_namespace.is_some()
    }
}

fn non_empty_var(key: &str) -> anyhow::Result<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("{} environment variable is not valid", key)),
    }
}

/// Name and namespace of an object in the host cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostObjectRef {
    pub name: String,
    pub namespace: String,
}

/// Settings for running Stack controllers in a host cluster while they act on
/// the tenant cluster. Built once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAwareConfig {
    pub host_controller_namespace: String,
    /// Tenant API host as reachable from pods in the host cluster
    pub tenant_api_service_host: String,
    pub tenant_api_service_port: String,
}

impl HostAwareConfig {
    pub fn new(host_controller_namespace: &str, tenant_api_url: &str) -> Result<Self> {
        let url = Url::parse(tenant_api_url).map_err(|e| {
            StackError::HostConfig(format!("invalid tenant API url {}: {}", tenant_api_url, e))
        })?;
        let host = url.host_str().ok_or_else(|| {
            StackError::HostConfig(format!("tenant API url {} has no host", tenant_api_url))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            StackError::HostConfig(format!("tenant API url {} has no port", tenant_api_url))
        })?;

        Ok(Self {
            host_controller_namespace: host_controller_namespace.to_string(),
            tenant_api_service_host: host.to_string(),
            tenant_api_service_port: port.to_string(),
        })
    }

    /// Where an object from a tenant namespace lives once relocated to the host
    pub fn object_ref_on_host(&self, name: &str, namespace: &str) -> HostObjectRef {
        HostObjectRef {
            name: truncate(
                &format!("{}.{}", namespace, name),
                names::LABEL_VALUE_LENGTH,
                names::DEFAULT_SUFFIX_LENGTH,
            ),
            namespace: self.host_controller_namespace.clone(),
        }
    }
}

/// Annotations pointing a relocated object back at its tenant origin
pub fn tenant_annotations(kind: &str, name: &str, namespace: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            format!("{}{}-name", annotations::TENANT_PREFIX, kind),
            name.to_string(),
        ),
        (
            format!("{}{}-namespace", annotations::TENANT_PREFIX, kind),
            namespace.to_string(),
        ),
    ])
}
