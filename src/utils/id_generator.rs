//! Run id generation.

use uuid::Uuid;

/// Generate a fresh run id of the form `run-<uuid-v4>`.
///
/// # Examples
///
/// ```
/// let id = turnloom::utils::id_generator::generate_run_id();
/// assert!(id.starts_with("run-"));
/// ```
#[must_use]
pub fn generate_run_id() -> String {
    format!("run-{}", Uuid::new_v4())
}
