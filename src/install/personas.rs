// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admin, edit and view cluster roles over the CRDs a Stack provides.
//!
//! The roles carry aggregation labels so that composite roles defined outside
//! the stack manager can select them. Roles are only ever created: an existing
//! role keeps its rules even when the Stack's CRDs change later on.

use crate::constants::labels::{SCOPE, VALUE_TRUE};
use crate::error::Result;
use crate::kubernetes::ops::create_if_absent;
use crate::labels::{aggregation_label, namespace_label, parent_labels, persona_role_name, scope_value};
use crate::types::stack::{PermissionScope, Stack};
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

const FULL_ACCESS: &[&str] = &[
    "get",
    "list",
    "watch",
    "create",
    "delete",
    "deletecollection",
    "patch",
    "update",
];
const READ_ONLY: &[&str] = &["get", "list", "watch"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub verbs: Vec<String>,
}

impl Persona {
    pub fn new(name: &str, verbs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// The personas to build roles for. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaTable {
    personas: Vec<Persona>,
}

impl PersonaTable {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.name == name)
    }
}

impl Default for PersonaTable {
    fn default() -> Self {
        Self::new(vec![
            Persona::new("admin", FULL_ACCESS),
            Persona::new("edit", FULL_ACCESS),
            Persona::new("view", READ_ONLY),
        ])
    }
}

/// Resources of a CRD a persona is granted: the plural name plus the status and
/// scale subresources when any version declares them
fn crd_resources(crd: &CustomResourceDefinition) -> Vec<String> {
    let plural = &crd.spec.names.plural;
    let subresources: Vec<_> = crd
        .spec
        .versions
        .iter()
        .filter_map(|v| v.subresources.as_ref())
        .collect();

    let mut resources = vec![plural.clone()];
    if subresources.iter().any(|s| s.status.is_some()) {
        resources.push(format!("{}/status", plural));
    }
    if subresources.iter().any(|s| s.scale.is_some()) {
        resources.push(format!("{}/scale", plural));
    }
    resources
}

pub fn persona_rules(crds: &[CustomResourceDefinition], persona: &Persona) -> Vec<PolicyRule> {
    crds.iter()
        .map(|crd| PolicyRule {
            api_groups: Some(vec![crd.spec.group.clone()]),
            resources: Some(crd_resources(crd)),
            verbs: persona.verbs.clone(),
            ..Default::default()
        })
        .collect()
}

pub fn persona_labels(stack: &Stack, scope: PermissionScope, persona: &str) -> BTreeMap<String, String> {
    let mut labels = parent_labels(stack);
    labels.insert(SCOPE.to_string(), scope_value(scope).to_string());
    if scope == PermissionScope::Namespaced {
        labels.insert(
            namespace_label(&stack.namespace().unwrap_or_default()),
            VALUE_TRUE.to_string(),
        );
    }
    labels.insert(aggregation_label(scope, persona), VALUE_TRUE.to_string());
    labels
}

pub fn persona_role(
    stack: &Stack,
    scope: PermissionScope,
    persona: &Persona,
    crds: &[CustomResourceDefinition],
) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(persona_role_name(stack, &persona.name)),
            labels: Some(persona_labels(stack, scope, &persona.name)),
            ..Default::default()
        },
        rules: Some(persona_rules(crds, persona)),
        ..Default::default()
    }
}

/// Create one cluster role per persona. Existing roles are left untouched.
#[instrument(skip_all, fields(stack = %stack.name_any()))]
pub async fn create_persona_roles(
    client: &Client,
    stack: &Stack,
    crds: &[CustomResourceDefinition],
    table: &PersonaTable,
) -> Result<()> {
    let scope = stack.permission_scope()?;
    let api: Api<ClusterRole> = Api::all(client.clone());

    for persona in table.personas() {
        let role = persona_role(stack, scope, persona, crds);
        create_if_absent(&api, &role, "failed to create persona role").await?;
    }

    debug!("Persona roles in place for {} CRDs", crds.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{already_exists_json, MockService};
    use crate::types::stack::StackSpec;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
        CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
        CustomResourceDefinitionVersion, CustomResourceSubresourceScale,
        CustomResourceSubresourceStatus, CustomResourceSubresources,
    };

    const CR_PATH: &str = "/apis/rbac.authorization.k8s.io/v1/clusterroles";

    fn make_crd(status: bool, scale: bool) -> CustomResourceDefinition {
        let subresources = (status || scale).then(|| CustomResourceSubresources {
            status: status.then(|| CustomResourceSubresourceStatus(serde_json::json!({}))),
            scale: scale.then(|| CustomResourceSubresourceScale {
                spec_replicas_path: ".spec.replicas".to_string(),
                status_replicas_path: ".status.replicas".to_string(),
                ..Default::default()
            }),
        });
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some("foos.example.org".to_string()),
                ..Default::default()
            },
            spec: CustomResourceDefinitionSpec {
                group: "example.org".to_string(),
                names: CustomResourceDefinitionNames {
                    kind: "Foo".to_string(),
                    plural: "foos".to_string(),
                    ..Default::default()
                },
                scope: "Namespaced".to_string(),
                versions: vec![CustomResourceDefinitionVersion {
                    name: "v1".to_string(),
                    served: true,
                    storage: true,
                    subresources,
                    ..Default::default()
                }],
                ..Default::default()
            },
            status: None,
        }
    }

    fn make_stack(scope: Option<&str>) -> Stack {
        let mut stack = Stack::new(
            "my-stack",
            StackSpec {
                permission_scope: scope.map(str::to_string),
                ..Default::default()
            },
        );
        stack.metadata.namespace = Some("team-a".to_string());
        stack
    }

    #[test]
    fn test_default_table() {
        let table = PersonaTable::default();
        let names: Vec<_> = table.personas().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "edit", "view"]);
        assert_eq!(table.get("admin").unwrap().verbs, table.get("edit").unwrap().verbs);
        assert_eq!(table.get("view").unwrap().verbs, vec!["get", "list", "watch"]);
    }

    #[test]
    fn test_admin_rule_with_status_subresource() {
        let table = PersonaTable::default();
        let rules = persona_rules(&[make_crd(true, false)], table.get("admin").unwrap());

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].api_groups.as_ref().unwrap(), &vec!["example.org".to_string()]);
        assert_eq!(rules[0].resources.as_ref().unwrap(), &vec!["foos".to_string(), "foos/status".to_string()]);
        assert_eq!(rules[0].verbs, FULL_ACCESS.iter().map(|v| v.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_rule_subresources() {
        let view = Persona::new("view", READ_ONLY);
        let plain = persona_rules(&[make_crd(false, false)], &view);
        assert_eq!(plain[0].resources.as_ref().unwrap(), &vec!["foos".to_string()]);

        let both = persona_rules(&[make_crd(true, true)], &view);
        assert_eq!(
            both[0].resources.as_ref().unwrap(),
            &vec!["foos".to_string(), "foos/status".to_string(), "foos/scale".to_string()]
        );
    }

    #[test]
    fn test_namespaced_labels() {
        let stack = make_stack(None);
        let labels = persona_labels(&stack, PermissionScope::Namespaced, "view");

        assert_eq!(labels.get(SCOPE).unwrap(), "namespace");
        assert_eq!(labels.get("namespace.stacks.geeko.me/team-a").unwrap(), "true");
        assert_eq!(labels.get("rbac.stacks.geeko.me/aggregate-to-namespace-view").unwrap(), "true");
        for (k, v) in parent_labels(&stack) {
            assert_eq!(labels.get(&k), Some(&v));
        }
    }

    #[test]
    fn test_cluster_labels_have_no_namespace_membership() {
        let labels = persona_labels(&make_stack(Some("Cluster")), PermissionScope::Cluster, "admin");

        assert_eq!(labels.get(SCOPE).unwrap(), "environment");
        assert!(!labels.contains_key("namespace.stacks.geeko.me/team-a"));
        assert!(labels.contains_key("rbac.stacks.geeko.me/aggregate-to-environment-admin"));
    }

    #[tokio::test]
    async fn test_creates_one_role_per_persona() {
        let mock = MockService::new().on_post_echo(CR_PATH, 201);
        let client = mock.clone().into_client();

        create_persona_roles(&client, &make_stack(None), &[make_crd(true, false)], &PersonaTable::default())
            .await
            .unwrap();

        let names: Vec<_> = mock
            .requests_to("POST", CR_PATH)
            .iter()
            .map(|r| r.json()["metadata"]["name"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "stack:team-a:my-stack:admin",
                "stack:team-a:my-stack:edit",
                "stack:team-a:my-stack:view"
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_roles_are_not_updated() {
        let mock = MockService::new().on_post(CR_PATH, 409, &already_exists_json("clusterroles", "r"));
        let client = mock.clone().into_client();
        let mut crd = make_crd(false, false);
        crd.spec.names.plural = "newfoos".to_string();

        create_persona_roles(&client, &make_stack(None), &[crd], &PersonaTable::default())
            .await
            .unwrap();

        assert_eq!(mock.requests_to("POST", CR_PATH).len(), 3);
        assert!(mock
            .requests()
            .iter()
            .all(|r| r.method != "PUT" && r.method != "PATCH"));
    }

    #[tokio::test]
    async fn test_custom_table() {
        let mock = MockService::new().on_post_echo(CR_PATH, 201);
        let client = mock.clone().into_client();
        let table = PersonaTable::new(vec![Persona::new("auditor", &["get"])]);

        create_persona_roles(&client, &make_stack(None), &[make_crd(false, false)], &table)
            .await
            .unwrap();

        let posted: ClusterRole = serde_json::from_value(mock.requests_to("POST", CR_PATH)[0].json()).unwrap();
        assert_eq!(posted.name_any(), "stack:team-a:my-stack:auditor");
        assert_eq!(posted.rules.unwrap()[0].verbs, vec!["get"]);
    }
}
