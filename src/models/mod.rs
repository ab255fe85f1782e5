pub mod activity;

pub use activity::{normalize_command, Activity, STATUS_SUCCESS};
