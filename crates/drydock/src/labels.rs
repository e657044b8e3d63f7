//! Reserved session labels.
//!
//! Every container a session creates carries these four labels; the reaper's
//! sweep filter is defined over exactly the same set, so the keys must stay
//! stable for the lifetime of a session.

use std::collections::BTreeMap;

/// Label key holding the session id.
pub const SESSION_ID_LABEL: &str = "org.drydock.session-id";

/// Label key holding the library version.
pub const VERSION_LABEL: &str = "org.drydock.version";

/// Label key holding the host-language tag.
pub const LANG_LABEL: &str = "org.drydock.lang";

/// Presence marker label.
pub const MARKER_LABEL: &str = "org.drydock";

/// Host-language tag value.
pub const LANG: &str = "rust";

/// The four reserved labels for a session.
#[must_use]
pub fn session_labels(session_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (SESSION_ID_LABEL.to_string(), session_id.to_string()),
        (
            VERSION_LABEL.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
        (LANG_LABEL.to_string(), LANG.to_string()),
        (MARKER_LABEL.to_string(), "true".to_string()),
    ])
}
