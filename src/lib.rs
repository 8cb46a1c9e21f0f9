//! Akhbarna - Sliding-Window Rate Limiting
//!
//! This crate implements the in-process rate limiter that protects the
//! Akhbarna news portal's HTTP routes. Each named policy admits at most a
//! fixed number of requests per caller within a trailing window, and
//! rejected requests are answered with HTTP 429 before any route logic runs.
//!
//! State lives in process memory only: replicas enforce their quotas
//! independently and nothing survives a restart.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
