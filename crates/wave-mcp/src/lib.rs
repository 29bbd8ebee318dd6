// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod bridge;
pub mod rpc;
pub mod supervisor;

pub use rpc::{RpcClient, RpcError};
pub use supervisor::McpSupervisor;
