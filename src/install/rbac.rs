// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service account, system role and binding for a Stack's controller

use crate::error::{Result, StackError};
use crate::kubernetes::ops::create_if_absent;
use crate::labels::{parent_labels, system_role_name};
use crate::types::stack::{PermissionScope, Stack};
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// Create the Stack's service account and grant it the Stack's declared rules.
///
/// Nothing is created when the Stack declares no rules. The role is bound
/// through a RoleBinding in the Stack's namespace for namespaced Stacks and a
/// ClusterRoleBinding for cluster-scoped ones. Returns the name of the system
/// role when one was provisioned.
#[instrument(skip(client, stack), fields(stack = %stack.name_any(), namespace = ?stack.namespace()))]
pub async fn provision(client: &Client, stack: &Stack) -> Result<Option<String>> {
    if stack.spec.permissions.rules.is_empty() {
        debug!("Stack declares no permissions, skipping RBAC");
        return Ok(None);
    }

    // resolve the scope first so a bad value creates nothing
    let scope = stack.permission_scope()?;
    let namespace = stack.namespace().unwrap_or_default();
    let owner = stack
        .owner_ref(&())
        .ok_or_else(|| StackError::MissingIdentity(format!("stack {}", stack.name_any())))?;

    let service_accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    let sa = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(stack.name_any()),
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![owner.clone()]),
            annotations: stack.service_account_annotations(),
            ..Default::default()
        },
        ..Default::default()
    };
    create_if_absent(&service_accounts, &sa, "failed to create service account").await?;

    let labels = parent_labels(stack);
    let role_name = system_role_name(stack);

    let cluster_roles: Api<ClusterRole> = Api::all(client.clone());
    let role = ClusterRole {
        metadata: ObjectMeta {
            name: Some(role_name.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        rules: Some(stack.spec.permissions.rules.clone()),
        ..Default::default()
    };
    create_if_absent(&cluster_roles, &role, "failed to create cluster role").await?;

    match scope {
        PermissionScope::Cluster => {
            let bindings: Api<ClusterRoleBinding> = Api::all(client.clone());
            let binding = cluster_role_binding(stack, &role_name, labels);
            create_if_absent(&bindings, &binding, "failed to create cluster role binding").await?;
        }
        PermissionScope::Namespaced => {
            let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
            let mut binding = role_binding(stack, &role_name);
            binding.metadata.owner_references = Some(vec![owner]);
            create_if_absent(&bindings, &binding, "failed to create role binding").await?;
        }
    }

    Ok(Some(role_name))
}

fn role_ref(role_name: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name: role_name.to_string(),
    }
}

fn service_account_subject(stack: &Stack) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: stack.name_any(),
        namespace: stack.namespace(),
        ..Default::default()
    }
}

fn role_binding(stack: &Stack, role_name: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(stack.name_any()),
            namespace: stack.namespace(),
            ..Default::default()
        },
        role_ref: role_ref(role_name),
        subjects: Some(vec![service_account_subject(stack)]),
    }
}

fn cluster_role_binding(
    stack: &Stack,
    role_name: &str,
    labels: BTreeMap<String, String>,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(stack.name_any()),
            labels: Some(labels),
            ..Default::default()
        },
        role_ref: role_ref(role_name),
        subjects: Some(vec![service_account_subject(stack)]),
    }
}
