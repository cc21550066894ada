// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Prints the Stack CRD manifest as YAML.
//!
//! Usage:
//!   cargo run --bin crdgen > deploy/stack.crd.yaml

use kube::CustomResourceExt;
use stack_manager::types::stack::Stack;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Stack::crd())?);
    Ok(())
}
