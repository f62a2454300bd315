//! Scenario tests for the delivery engine and client.
//!
//! - `harness.rs`  - fake transport, broken queue and engine wiring
//! - `delivery.rs` - immediate delivery, retry schedule, gating, cancellation
//! - `replay.rs`   - startup replay over the file queue
//! - `client.rs`   - facade event construction and gating
