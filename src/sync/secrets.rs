// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Copying a service account token secret from the tenant cluster to the host cluster

use crate::config::HostObjectRef;
use crate::error::{is_not_found, ApiContext, Result, StackError};
use crate::kubernetes::ops::create_if_absent;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{api::ObjectMeta, Api, Client};
use tracing::{info, instrument};

/// Copy the first token secret of a tenant service account to `target` on the
/// host cluster, owned by `owner` so it goes away with the workload.
///
/// Kubernetes generates the token secret some time after the service account
/// is created; until then this fails with `TokenSecretNotGenerated`.
#[instrument(
    skip_all,
    fields(
        sa = %format!("{}/{}", namespace, service_account),
        target = %format!("{}/{}", target.namespace, target.name)
    )
)]
pub async fn sync_token_secret(
    tenant: &Client,
    host: &Client,
    service_account: &str,
    namespace: &str,
    target: &HostObjectRef,
    owner: OwnerReference,
) -> Result<()> {
    let service_accounts: Api<ServiceAccount> = Api::namespaced(tenant.clone(), namespace);
    let sa = match service_accounts.get(service_account).await {
        Ok(sa) => sa,
        Err(e) if is_not_found(&e) => {
            return Err(StackError::ServiceAccountNotFound(format!(
                "{}/{}",
                namespace, service_account
            )))
        }
        Err(e) => return Err(e).context("failed to get service account"),
    };

    let secret_name = sa
        .secrets
        .as_ref()
        .and_then(|s| s.first())
        .and_then(|r| r.name.clone())
        .ok_or_else(|| {
            StackError::TokenSecretNotGenerated(format!("{}/{}", namespace, service_account))
        })?;

    let secrets: Api<Secret> = Api::namespaced(tenant.clone(), namespace);
    let token = secrets
        .get(&secret_name)
        .await
        .context("failed to get service account token secret")?;

    let host_secrets: Api<Secret> = Api::namespaced(host.clone(), &target.namespace);
    let copy = host_secret(&token, target, owner);
    if create_if_absent(&host_secrets, &copy, "failed to create token secret on host").await? {
        info!(
            "Copied token secret {}/{} to {}/{}",
            namespace, secret_name, target.namespace, target.name
        );
    }

    Ok(())
}

/// The host cluster copy of a token secret: same data, new identity
pub fn host_secret(source: &Secret, target: &HostObjectRef, owner: OwnerReference) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        data: source.data.clone(),
        ..Default::default()
    }
}
