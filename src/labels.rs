// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label keys, label values and object names derived from a Stack identity.

use crate::constants::{labels, names};
use crate::types::stack::{PermissionScope, Stack};
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Shorten `value` to at most `max_len` characters.
///
/// Values that fit are returned untouched. Longer values keep a prefix and get
/// `-` plus the first `suffix_len` hex characters of the SHA-256 of the full
/// value, so the same input always yields the same output.
pub fn truncate(value: &str, max_len: usize, suffix_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }

    let digest = Sha256::digest(value.as_bytes());
    let hash: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let keep = max_len.saturating_sub(suffix_len + 1);
    let prefix: String = value.chars().take(keep).collect();
    let prefix = prefix.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());

    format!("{}-{}", prefix, &hash[..suffix_len])
}

fn label_value(value: &str) -> String {
    truncate(value, names::LABEL_VALUE_LENGTH, names::DEFAULT_SUFFIX_LENGTH)
}

/// Labels identifying the Stack that created an object.
/// Teardown deletes cluster roles, bindings and workloads selected by these.
pub fn parent_labels(stack: &Stack) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::PARENT_GROUP.to_string(), Stack::group(&()).to_string()),
        (labels::PARENT_VERSION.to_string(), Stack::version(&()).to_string()),
        (labels::PARENT_KIND.to_string(), Stack::kind(&()).to_string()),
        (
            labels::PARENT_NAMESPACE.to_string(),
            label_value(&stack.namespace().unwrap_or_default()),
        ),
        (labels::PARENT_NAME.to_string(), label_value(&stack.name_any())),
    ])
}

/// Render labels as a label selector string
pub fn selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn namespace_label(namespace: &str) -> String {
    format!("{}{}", labels::NAMESPACE_PREFIX, namespace)
}

/// Smallest room left for the Stack name in a multi-parent key
const MIN_PARENT_NAME_LENGTH: usize = names::DEFAULT_SUFFIX_LENGTH + 2;

/// Namespace part of a multi-parent key, shortened so a Stack name still fits
fn parent_namespace(namespace: &str) -> String {
    truncate(
        namespace,
        names::LABEL_VALUE_LENGTH - MIN_PARENT_NAME_LENGTH - 1,
        names::DEFAULT_SUFFIX_LENGTH,
    )
}

/// Prefix shared by the multi-parent labels of every Stack in `namespace`
pub fn multi_parent_prefix(namespace: &str) -> String {
    format!("{}{}.", labels::MULTI_PARENT_PREFIX, parent_namespace(namespace))
}

/// The reference-count label a Stack places on every CRD it depends on.
/// The `<namespace>.<name>` part never exceeds the label name limit.
pub fn multi_parent_label(stack: &Stack) -> String {
    let namespace = parent_namespace(&stack.namespace().unwrap_or_default());
    let budget = names::LABEL_VALUE_LENGTH - namespace.len() - 1;
    format!(
        "{}{}.{}",
        labels::MULTI_PARENT_PREFIX,
        namespace,
        truncate(&stack.name_any(), budget, names::DEFAULT_SUFFIX_LENGTH)
    )
}

pub fn scope_value(scope: PermissionScope) -> &'static str {
    match scope {
        PermissionScope::Namespaced => labels::SCOPE_NAMESPACE,
        PermissionScope::Cluster => labels::SCOPE_ENVIRONMENT,
    }
}

pub fn aggregation_label(scope: PermissionScope, persona: &str) -> String {
    format!(
        "{}{}-{}",
        labels::AGGREGATE_PREFIX,
        scope_value(scope),
        persona
    )
}

pub fn persona_role_name(stack: &Stack, persona: &str) -> String {
    format!(
        "stack:{}:{}:{}",
        stack.namespace().unwrap_or_default(),
        stack.name_any(),
        persona
    )
}

pub fn system_role_name(stack: &Stack) -> String {
    persona_role_name(stack, names::SYSTEM_PERSONA)
}

/// Name of the Deployment or Job running the Stack's own controller
pub fn controller_name(stack: &Stack) -> String {
    let name = truncate(
        &stack.name_any(),
        names::LABEL_VALUE_LENGTH - names::CONTROLLER_SUFFIX.len(),
        names::DEFAULT_SUFFIX_LENGTH,
    );
    format!("{}{}", name, names::CONTROLLER_SUFFIX)
}

pub fn is_managed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(labels::MANAGED_BY).map(String::as_str) == Some(labels::MANAGED_BY_VALUE)
}

pub fn has_prefixed_label(labels: &BTreeMap<String, String>, prefix: &str) -> bool {
    labels.keys().any(|k| k.starts_with(prefix))
}
