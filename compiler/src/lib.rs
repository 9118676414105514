// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Compiles CQL search queries into backend-agnostic query plans.

pub mod config;
pub mod cql;

pub use config::CompilerConfig;
pub use cql::{compile, compile_with_config, CqlError, QueryPlan, Schema};
