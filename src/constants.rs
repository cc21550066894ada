// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Well-known label keys and values placed on objects owned or shared by Stacks.
///
/// These keys are a stable contract: composite roles defined outside of the
/// operator select persona roles through the aggregation keys.
pub mod labels {
    /// Ownership marker placed on CRDs managed by the stack manager
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const MANAGED_BY_VALUE: &str = "stack-manager";

    /// `namespace.stacks.geeko.me/<namespace>`
    pub const NAMESPACE_PREFIX: &str = "namespace.stacks.geeko.me/";
    /// `parent.stacks.geeko.me/<namespace>.<name>`
    pub const MULTI_PARENT_PREFIX: &str = "parent.stacks.geeko.me/";
    /// `rbac.stacks.geeko.me/aggregate-to-<scope>-<persona>`
    pub const AGGREGATE_PREFIX: &str = "rbac.stacks.geeko.me/aggregate-to-";
    pub const SCOPE: &str = "stacks.geeko.me/scope";

    pub const PARENT_GROUP: &str = "core.stacks.geeko.me/parent-group";
    pub const PARENT_VERSION: &str = "core.stacks.geeko.me/parent-version";
    pub const PARENT_KIND: &str = "core.stacks.geeko.me/parent-kind";
    pub const PARENT_NAMESPACE: &str = "core.stacks.geeko.me/parent-namespace";
    pub const PARENT_NAME: &str = "core.stacks.geeko.me/parent-name";

    pub const VALUE_TRUE: &str = "true";

    pub const SCOPE_NAMESPACE: &str = "namespace";
    pub const SCOPE_ENVIRONMENT: &str = "environment";

    /// Selector label tying a controller workload to its own pods
    pub const APP: &str = "app";
}

/// Annotation keys used on relocated objects in the host cluster
pub mod annotations {
    pub const TENANT_PREFIX: &str = "tenant.stacks.geeko.me/";
}

/// Naming limits
pub mod names {
    /// Maximum length of a label value or of the name part of a label key
    pub const LABEL_VALUE_LENGTH: usize = 63;
    /// Number of hash characters appended when a name is truncated
    pub const DEFAULT_SUFFIX_LENGTH: usize = 5;
    pub const CONTROLLER_SUFFIX: &str = "-controller";
    pub const SYSTEM_PERSONA: &str = "system";
}

/// Pod rewrite constants for controllers relocated to the host cluster
pub mod host_aware {
    pub const SA_VOLUME_NAME: &str = "sa-token";
    pub const SA_MOUNT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
    pub const ENV_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
    pub const ENV_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";
    pub const ENV_POD_NAMESPACE: &str = "POD_NAMESPACE";
}

/// Reconcile timing
pub mod timing {
    /// Deadline for a single reconcile call
    pub const RECONCILE_TIMEOUT_SECS: u64 = 60;
    /// Fixed delay before retrying a failed reconcile
    pub const REQUEUE_ON_ERROR_SECS: u64 = 10;
    /// Fixed delay before re-checking a successfully created Stack
    pub const REQUEUE_ON_SUCCESS_SECS: u64 = 60;
    /// Attempts for a label mutation that keeps hitting resourceVersion conflicts
    pub const LABEL_CONFLICT_RETRIES: usize = 5;
}

/// The finalizer guarding Stack teardown
pub const FINALIZER: &str = "finalizer.stacks.geeko.me";

/// The operator name, used as field manager
pub const OPERATOR_NAME: &str = "stack-manager";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
