//! Domain ID generation
//!
//! IDs use the format `{type}-{uuid-v7-simple}`, e.g.
//! `task-01943a2b7c1e7d2f8a3b4c5d6e7f8091`. The v7 prefix keeps ids
//! time-sortable; the full uuid keeps them unique.

/// Generate a domain ID for the given type
pub fn generate_id(domain_type: &str) -> String {
    format!("{}-{}", domain_type, uuid::Uuid::now_v7().simple())
}

/// New task id
pub fn task_id() -> String {
    generate_id("task")
}

/// New session id
pub fn session_id() -> String {
    generate_id("sess")
}
