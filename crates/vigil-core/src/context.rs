//! Run context consulted by dangerous predicates
//!
//! Resource flags describe the package under review. A flag can be absent,
//! present but false, or present and true; predicates that depend on a flag
//! only fire when it is explicitly enabled.

use std::collections::BTreeMap;

/// Set when the package declares `<em:bootstrap>true</em:bootstrap>`.
pub const BOOTSTRAP: &str = "em:bootstrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    Unknown,
    Disabled,
    Enabled,
}

impl From<bool> for ResourceState {
    fn from(value: bool) -> Self {
        if value {
            ResourceState::Enabled
        } else {
            ResourceState::Disabled
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    resources: BTreeMap<String, ResourceState>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: &str, state: impl Into<ResourceState>) -> Self {
        self.set_resource(name, state);
        self
    }

    pub fn set_resource(&mut self, name: &str, state: impl Into<ResourceState>) {
        self.resources.insert(name.to_string(), state.into());
    }

    pub fn resource(&self, name: &str) -> ResourceState {
        self.resources.get(name).copied().unwrap_or_default()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.resource(name) == ResourceState::Enabled
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, ResourceState)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_resource_is_unknown() {
        let run = RunContext::new();

        assert_eq!(run.resource(BOOTSTRAP), ResourceState::Unknown);
        assert!(!run.is_enabled(BOOTSTRAP));
    }

    #[test]
    fn false_resource_is_disabled_not_unknown() {
        let run = RunContext::new().with_resource(BOOTSTRAP, false);

        assert_eq!(run.resource(BOOTSTRAP), ResourceState::Disabled);
        assert!(!run.is_enabled(BOOTSTRAP));
    }

    #[test]
    fn true_resource_is_enabled() {
        let run = RunContext::new().with_resource(BOOTSTRAP, true);

        assert!(run.is_enabled(BOOTSTRAP));
    }
}
