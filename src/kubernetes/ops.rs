// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Idempotent create, get-or-create and delete-by-label helpers

use crate::constants::OPERATOR_NAME;
use crate::error::{is_already_exists, is_not_found, ApiContext, Result};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::{debug, info};

pub fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..Default::default()
    }
}

/// Create an object, treating "already exists" as success.
/// Returns whether the object was created by this call.
pub async fn create_if_absent<K>(api: &Api<K>, obj: &K, context: &'static str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    match api.create(&post_params(), obj).await {
        Ok(_) => {
            info!("Created {} {}", K::kind(&()), obj.name_any());
            Ok(true)
        }
        Err(e) if is_already_exists(&e) => {
            debug!("{} {} already exists", K::kind(&()), obj.name_any());
            Ok(false)
        }
        Err(e) => Err(e).context(context),
    }
}

/// Return the live object with the name of `obj`, creating it when absent.
/// An existing object is returned as-is.
pub async fn get_or_create<K>(api: &Api<K>, obj: &K, context: &'static str) -> Result<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let name = obj.name_any();

    match api.get(&name).await {
        Ok(existing) => {
            debug!("{} {} already exists", K::kind(&()), name);
            Ok(existing)
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            match api.create(&post_params(), obj).await {
                Ok(created) => {
                    info!("Created {} {}", K::kind(&()), name);
                    Ok(created)
                }
                // lost a race with another writer, use theirs
                Err(e) if is_already_exists(&e) => api.get(&name).await.context(context),
                Err(e) => Err(e).context(context),
            }
        }
        Err(e) => Err(e).context(context),
    }
}

/// Delete every object matching `selector`. Nothing to delete is not an error.
pub async fn delete_labeled<K>(api: &Api<K>, selector: &str, context: &'static str) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned,
{
    let lp = ListParams::default().labels(selector);

    match api.delete_collection(&DeleteParams::background(), &lp).await {
        Ok(_) => {
            info!("Deleted {} objects matching {}", K::kind(&()), selector);
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            debug!("No {} objects left matching {}", K::kind(&()), selector);
            Ok(())
        }
        Err(e) => Err(e).context(context),
    }
}
