//! Integration tests for the Slurm operator's public API
//!
//! These run without a Kubernetes cluster: they exercise planning, teardown
//! ordering, artifact rendering and preflight through the library surface.
//!
//! ```bash
//! cargo test --test operator
//! ```

mod operator_tests;
