//! The lifecycle enum shared by every provider and the instance state machine.

use std::fmt;

/// Normalized lifecycle state of a managed backend instance.
///
/// `NotAvailable` means the provider could not be queried at all (transient
/// API failure, credentials rejected, etc). `Error` means a `start()` call
/// was attempted and failed; the instance is not assumed to be in any
/// particular provider-side state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    NotAvailable,
    Starting,
    NotRun,
    Stopping,
    Running,
    Error,
}

impl LifecycleState {
    /// Lower-case, space-separated string form used in logs and waiting-page copy.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::NotAvailable => "not available",
            LifecycleState::Starting => "starting",
            LifecycleState::NotRun => "not run",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Running => "running",
            LifecycleState::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_form_is_lower_case_with_spaces() {
        assert_eq!(LifecycleState::NotAvailable.as_str(), "not available");
        assert_eq!(LifecycleState::NotRun.as_str(), "not run");
        assert_eq!(LifecycleState::Running.to_string(), "running");
    }
}
