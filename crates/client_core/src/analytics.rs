//! Usage logging.
//!
//! The site records pageviews, events and a user-status dimension. Here they
//! are structured log lines under the `analytics` target, so a subscriber can
//! filter them out or ship them somewhere without touching the callers.

use tracing::info;

pub fn pageview(path: &str) {
    info!(target: "analytics", path, "pageview");
}

pub fn event(category: &str, action: &str, label: Option<&str>) {
    match label {
        Some(label) => info!(target: "analytics", category, action, label, "event"),
        None => info!(target: "analytics", category, action, "event"),
    }
}

pub fn dimension(name: &str, value: &str) {
    info!(target: "analytics", name, value, "dimension");
}
