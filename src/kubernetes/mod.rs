// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, client creation and idempotent object operations.

pub mod client;
pub mod crd;
pub mod ops;

pub use client::{connect, Clusters};
pub use crd::wait_for_stack_crd;
