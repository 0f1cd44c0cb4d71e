//! Mini Agent Platform - multi-tenant agent execution gateway
//!
//! This crate runs AI agents on behalf of tenants behind an HTTP API. Every
//! execution is charged against a per-tenant sliding-window rate limit that
//! is kept either in process or in Redis, so several gateway replicas can
//! share one quota.

pub mod config;
pub mod error;
pub mod execution;
pub mod http;
pub mod ratelimit;
