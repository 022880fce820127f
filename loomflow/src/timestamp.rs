//! ISO 8601 timestamps for snapshot `created_at` fields (§6).
//!
//! The teacher depends on `chrono` directly (`loom/Cargo.toml`: `chrono =
//! { version = "0.4", features = ["serde"] }`, commented "ISO timestamps")
//! and reaches for it exactly this way — `chrono::Utc::now().to_rfc3339()` —
//! in `loom-examples/examples/react_memory.rs`. This module does the same.

use chrono::Utc;

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}
