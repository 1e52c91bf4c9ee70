//! Integration test suite for the task graph engine.
//!
//! These tests drive the public API the way an executor would: build or
//! plan a graph, pull ready tasks, report results, and archive the graph.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Planner templates run to completion
//! - `scenarios`: Documented behaviours of the graph and node types
//! - `parallel_workers`: Concurrent workers sharing one graph
//! - `recovery`: Retries, cancellation, reset and corrupt-graph handling
//! - `performance`: Timing thresholds for large graphs

mod fixtures;

mod parallel_workers;
mod performance;
mod recovery;
mod scenarios;
