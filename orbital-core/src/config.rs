//! Container Configuration
//!
//! The recognized options are few: a name for logging, the failure policy,
//! an optional cap on in-flight intents, and whether instrumentation hooks
//! are registered by default.
//!
//! Configuration can be built in code or parsed from JSON:
//!
//! ```rust,ignore
//! let config = ContainerConfig::from_json(r#"{ "failure_policy": "escalate" }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ContainerError;

/// What happens when an intent fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The failing intent terminates alone. Other intents keep running.
    #[default]
    Isolate,

    /// The first failure shuts the whole container down.
    Escalate,
}

/// Container-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Name used in tracing spans.
    pub name: String,

    /// How intent failures are handled.
    pub failure_policy: FailurePolicy,

    /// Maximum number of intents in flight. `None` means unbounded.
    pub max_in_flight: Option<usize>,

    /// Whether submissions register with the idling resource unless told otherwise.
    pub register_idling: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "container".to_string(),
            failure_policy: FailurePolicy::Isolate,
            max_in_flight: None,
            register_idling: true,
        }
    }
}

impl ContainerConfig {
    /// Parse a configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ContainerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default submission options derived from this configuration.
    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions {
            register_idling: self.register_idling,
        }
    }
}

/// Per-submission switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Bracket this intent with `begin_work`/`end_work` on the idling resource.
    pub register_idling: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            register_idling: true,
        }
    }
}

impl SubmitOptions {
    /// Options that skip the idling resource.
    pub fn without_idling() -> Self {
        Self {
            register_idling: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = ContainerConfig::from_json("{}").unwrap();
        assert_eq!(config, ContainerConfig::default());
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert!(config.register_idling);
    }

    #[test]
    fn parses_all_fields() {
        let config = ContainerConfig::from_json(
            r#"{
                "name": "checkout",
                "failure_policy": "escalate",
                "max_in_flight": 8,
                "register_idling": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "checkout");
        assert_eq!(config.failure_policy, FailurePolicy::Escalate);
        assert_eq!(config.max_in_flight, Some(8));
        assert!(!config.submit_options().register_idling);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ContainerConfig::from_json(r#"{ "retries": 3 }"#).unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));
    }
}
