// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cross-cluster secret synchronization for host-aware controllers.

pub mod secrets;

pub use secrets::sync_token_secret;
