//! Integration tests for container launch operations.
//!
//! These tests are implemented in:
//! `crates/burrow-runtime/tests/e2e_test.rs`
//!
//! Covered scenarios:
//! - `pipeline_volume_spec_prepares_container_side`: A parsed volume creates its container directory
//! - `pipeline_bad_volume_specs_never_reach_the_launcher`: Malformed volume specs are config errors
//! - `pipeline_cgroup_limits_apply_and_destroy`: Limits, attach, and idempotent removal on a fake hierarchy
//! - `pipeline_handoff_round_trip`: The command line survives the handoff pipe
//! - `pipeline_record_lifecycle`: Info records are saved, updated, loaded, and removed
//! - `pipeline_missing_image_aborts_launch`: A missing base image leaves nothing behind
//! - `privileged_workspace_build_and_teardown`: Overlay and volume mounts, then full teardown (root only)
