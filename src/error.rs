// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A declared CRD that has no matching registration in the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCrd {
    pub group: String,
    pub kind: String,
    pub version: String,
}

impl fmt::Display for MissingCrd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

fn join_missing(missing: &[MissingCrd]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{context}: {source}")]
    Api {
        context: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("{context}: {source}")]
    Step {
        context: &'static str,
        #[source]
        source: Box<StackError>,
    },

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Invalid host configuration: {0}")]
    HostConfig(String),

    #[error("invalid permissionScope for stack: {0:?}")]
    InvalidPermissionScope(String),

    #[error("host aware mode is not enabled")]
    HostAwareDisabled,

    #[error("missing CRDs: {}", join_missing(.0))]
    MissingCrds(Vec<MissingCrd>),

    #[error("service account {0} is not found (not created yet?)")]
    ServiceAccountNotFound(String),

    #[error("service account {0} token secret is not generated yet")]
    TokenSecretNotGenerated(String),

    #[error("{0} has no name or uid")]
    MissingIdentity(String),

    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, StackError>;

/// Attach a step description to a failing API call
pub trait ApiContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ApiContext<T> for std::result::Result<T, kube::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| StackError::Api { context, source })
    }
}

/// Attach a step description to a failing pipeline step
pub trait StepContext<T> {
    fn step(self, context: &'static str) -> Result<T>;
}

impl<T> StepContext<T> for Result<T> {
    fn step(self, context: &'static str) -> Result<T> {
        self.map_err(|source| StackError::Step {
            context,
            source: Box::new(source),
        })
    }
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "AlreadyExists")
}

pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "Conflict")
}
