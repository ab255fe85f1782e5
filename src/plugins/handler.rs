use anyhow::Result;

use crate::models::Activity;

const QUERY_PLACEHOLDER: &str = "{query}";

/// A plugin that acts on activities matched by its command's trigger.
///
/// Returning `Err` reports a failure; the rendered error becomes the
/// `[reason]` of the command's failure response.
pub trait ActivityHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at registration, before any activity is dispatched.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// `query` is the command text left after the trigger phrase, if any.
    fn process_activity(&self, activity: &Activity, query: Option<&str>) -> Result<()>;
}

/// Replaces every `{query}` in `template` with the residual query (empty when absent).
pub fn fill_query(template: &str, query: Option<&str>) -> String {
    template.replace(QUERY_PLACEHOLDER, query.unwrap_or_default())
}
