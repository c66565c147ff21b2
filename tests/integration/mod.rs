//! Integration test suite for the warden orchestrator.
//!
//! These tests exercise full remediation cycles from findings document to
//! run report, including correlation-driven ordering, abort and rollback,
//! and self-healing behavior.
//!
//! # Test Categories
//!
//! - `planning`: findings to selected plan, approval exclusion, constraints
//! - `execution`: full cycles, concurrency bounds, events, self-healing
//! - `recovery`: abort decision, LIFO rollback, circuit breaker
//!
//! All collaborators are in-memory fakes; no cloud APIs are touched.

mod fixtures;

mod planning;
mod execution;
mod recovery;
