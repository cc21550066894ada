// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Matching a Stack's declared CRDs against the cluster and curating the
//! namespace and multi-parent labels on those shared CRDs.
//!
//! CRDs can be provided by several Stacks at once. Each Stack marks the CRDs it
//! depends on with its own multi-parent label, and the namespace label is only
//! released once no Stack of that namespace is left on the CRD. CRDs that are
//! not marked as managed by the stack manager are never touched.
//!
//! Label changes are written with `replace`, which carries the resourceVersion
//! the change was computed from. A concurrent writer makes the API server
//! answer with a conflict, after which the CRD is re-read and the change
//! recomputed.

use crate::constants::labels::VALUE_TRUE;
use crate::constants::timing::LABEL_CONFLICT_RETRIES;
use crate::error::{is_conflict, is_not_found, ApiContext, MissingCrd, Result, StackError};
use crate::kubernetes::ops::post_params;
use crate::labels::{has_prefixed_label, is_managed, multi_parent_label, multi_parent_prefix, namespace_label};
use crate::types::stack::{CrdDescriptor, Stack};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument, warn};

fn crd_serves(crd: &CustomResourceDefinition, descriptor: &CrdDescriptor) -> bool {
    crd.spec.group == descriptor.group()
        && crd.spec.names.kind == descriptor.kind
        && crd.spec.versions.iter().any(|v| v.name == descriptor.version())
}

/// CRDs in `available` serving at least one of `wanted`, without duplicates
pub fn match_crds(
    wanted: &[CrdDescriptor],
    available: Vec<CustomResourceDefinition>,
) -> Vec<CustomResourceDefinition> {
    let mut seen = HashSet::new();
    available
        .into_iter()
        .filter(|crd| wanted.iter().any(|w| crd_serves(crd, w)))
        .filter(|crd| seen.insert(crd.name_any()))
        .collect()
}

/// Verify every wanted CRD is served by one of `matched`.
/// Reports all missing (group, kind, version) triples at once.
pub fn ensure_fulfilled(wanted: &[CrdDescriptor], matched: &[CustomResourceDefinition]) -> Result<()> {
    let missing: Vec<MissingCrd> = wanted
        .iter()
        .filter(|w| !matched.iter().any(|crd| crd_serves(crd, w)))
        .map(|w| MissingCrd {
            group: w.group().to_string(),
            kind: w.kind.clone(),
            version: w.version().to_string(),
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StackError::MissingCrds(missing))
    }
}

/// Fetch the CRDs the Stack declares that are present in the cluster.
/// Declared CRDs that are absent are simply not returned; use
/// `ensure_fulfilled` to detect them.
#[instrument(skip(client, stack), fields(stack = %stack.name_any()))]
pub async fn crds_for_stack(client: &Client, stack: &Stack) -> Result<Vec<CustomResourceDefinition>> {
    if stack.spec.crds.is_empty() {
        return Ok(vec![]);
    }

    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let list = api
        .list(&ListParams::default())
        .await
        .context("CRDs could not be listed")?;

    Ok(match_crds(&stack.spec.crds, list.items))
}

/// Add `key=true`. Returns whether the labels changed.
pub fn add_label(labels: &mut BTreeMap<String, String>, key: &str) -> bool {
    if !is_managed(labels) || labels.get(key).map(String::as_str) == Some(VALUE_TRUE) {
        return false;
    }
    labels.insert(key.to_string(), VALUE_TRUE.to_string());
    true
}

/// Drop a Stack's multi-parent label, and the namespace label with it when no
/// other Stack of that namespace still claims the CRD. Returns whether the
/// labels changed.
pub fn release_labels(
    labels: &mut BTreeMap<String, String>,
    multi_parent: &str,
    parent_prefix: &str,
    namespace_key: &str,
) -> bool {
    if !is_managed(labels) {
        return false;
    }

    let mut changed = labels.remove(multi_parent).is_some();
    if !has_prefixed_label(labels, parent_prefix) {
        changed |= labels.remove(namespace_key).is_some();
    }
    changed
}

/// Apply `mutate` to the labels of `crd` and write the result back with
/// optimistic concurrency. Missing or unmanaged CRDs are skipped.
///
/// Returns the latest known state of the CRD, or `None` once it is gone.
async fn update_labels<F>(
    api: &Api<CustomResourceDefinition>,
    crd: &CustomResourceDefinition,
    mutate: F,
) -> Result<Option<CustomResourceDefinition>>
where
    F: Fn(&mut BTreeMap<String, String>) -> bool,
{
    let name = crd.name_any();
    let mut current = crd.clone();
    let mut attempt = 0;

    loop {
        attempt += 1;
        if !is_managed(current.labels()) {
            debug!("Skipping unmanaged CRD {}", name);
            return Ok(Some(current));
        }

        let mut changed = current.clone();
        if !mutate(changed.labels_mut()) {
            debug!("CRD {} labels already up to date", name);
            return Ok(Some(current));
        }

        match api.replace(&name, &post_params(), &changed).await {
            Ok(updated) => {
                debug!("Updated labels of CRD {}", name);
                return Ok(Some(updated));
            }
            Err(e) if is_conflict(&e) && attempt < LABEL_CONFLICT_RETRIES => {
                debug!("Conflict updating CRD {} (attempt {}), re-reading", name, attempt);
                match api.get(&name).await {
                    Ok(fresh) => current = fresh,
                    Err(e) if is_not_found(&e) => return Ok(None),
                    Err(e) => return Err(e).context("failed to re-read CRD"),
                }
            }
            Err(e) if is_not_found(&e) => {
                debug!("CRD {} is gone, nothing to label", name);
                return Ok(None);
            }
            Err(e) => return Err(e).context("failed to update CRD labels"),
        }
    }
}

/// Add `key` to every managed CRD in `crds`, returning their latest state
async fn add_label_to_all(
    client: &Client,
    crds: &[CustomResourceDefinition],
    key: &str,
) -> Result<Vec<CustomResourceDefinition>> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let mut latest = Vec::with_capacity(crds.len());

    for crd in crds {
        if let Some(crd) = update_labels(&api, crd, |labels| add_label(labels, key)).await? {
            latest.push(crd);
        }
    }
    Ok(latest)
}

/// Mark every managed CRD with the namespace of the Stack.
/// Returns the CRDs as written, for the next label step to build on.
#[instrument(skip_all, fields(stack = %stack.name_any()))]
pub async fn label_namespace(
    client: &Client,
    stack: &Stack,
    crds: &[CustomResourceDefinition],
) -> Result<Vec<CustomResourceDefinition>> {
    let key = namespace_label(&stack.namespace().unwrap_or_default());
    add_label_to_all(client, crds, &key).await
}

/// Mark every managed CRD with the Stack's multi-parent label
#[instrument(skip_all, fields(stack = %stack.name_any()))]
pub async fn label_multi_parent(
    client: &Client,
    stack: &Stack,
    crds: &[CustomResourceDefinition],
) -> Result<Vec<CustomResourceDefinition>> {
    add_label_to_all(client, crds, &multi_parent_label(stack)).await
}

/// Remove the labels this Stack placed on its CRDs, leaving the CRDs and the
/// labels of other Stacks in place.
///
/// CRDs that were removed manually are no longer listed and need no release.
#[instrument(skip(client, stack), fields(stack = %stack.name_any()))]
pub async fn release(client: &Client, stack: &Stack) -> Result<()> {
    let crds = crds_for_stack(client, stack).await?;
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());

    let namespace = stack.namespace().unwrap_or_default();
    let multi_parent = multi_parent_label(stack);
    let prefix = multi_parent_prefix(&namespace);
    let namespace_key = namespace_label(&namespace);

    for crd in &crds {
        if !is_managed(crd.labels()) {
            warn!("Skipping label removal for unmanaged CRD {}", crd.name_any());
            continue;
        }
        update_labels(&api, crd, |labels| {
            release_labels(labels, &multi_parent, &prefix, &namespace_key)
        })
        .await?;
    }

    info!("Released {} CRDs", crds.len());
    Ok(())
}
