//! Pure mappers from a provider's native status vocabulary to [`LifecycleState`].
//!
//! Unknown strings always map to `NotAvailable` rather than erroring, so a
//! new provider-side status value degrades to "can't tell" instead of
//! panicking or bubbling an error out of a monitor tick.

use crate::lifecycle::LifecycleState;

/// Normalizes an EC2 `Instance.State.Name` value.
pub fn normalize_ec2_status(raw: &str) -> LifecycleState {
    match raw {
        "pending" => LifecycleState::Starting,
        "running" => LifecycleState::Running,
        "shutting-down" | "stopping" => LifecycleState::Stopping,
        "stopped" | "terminated" => LifecycleState::NotRun,
        _ => LifecycleState::NotAvailable,
    }
}

/// Normalizes a GCE `Instance.status` value.
pub fn normalize_gce_status(raw: &str) -> LifecycleState {
    match raw {
        "PROVISIONING" | "STAGING" => LifecycleState::Starting,
        "RUNNING" => LifecycleState::Running,
        "STOPPING" | "SUSPENDING" => LifecycleState::Stopping,
        "SUSPENDED" | "TERMINATED" => LifecycleState::NotRun,
        _ => LifecycleState::NotAvailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec2_known_values_round_trip() {
        assert_eq!(normalize_ec2_status("pending"), LifecycleState::Starting);
        assert_eq!(normalize_ec2_status("running"), LifecycleState::Running);
        assert_eq!(normalize_ec2_status("shutting-down"), LifecycleState::Stopping);
        assert_eq!(normalize_ec2_status("stopping"), LifecycleState::Stopping);
        assert_eq!(normalize_ec2_status("stopped"), LifecycleState::NotRun);
        assert_eq!(normalize_ec2_status("terminated"), LifecycleState::NotRun);
    }

    #[test]
    fn ec2_unknown_value_is_not_available() {
        assert_eq!(normalize_ec2_status("quantum-superposition"), LifecycleState::NotAvailable);
        assert_eq!(normalize_ec2_status(""), LifecycleState::NotAvailable);
    }

    #[test]
    fn gce_known_values_round_trip() {
        assert_eq!(normalize_gce_status("PROVISIONING"), LifecycleState::Starting);
        assert_eq!(normalize_gce_status("STAGING"), LifecycleState::Starting);
        assert_eq!(normalize_gce_status("RUNNING"), LifecycleState::Running);
        assert_eq!(normalize_gce_status("STOPPING"), LifecycleState::Stopping);
        assert_eq!(normalize_gce_status("SUSPENDING"), LifecycleState::Stopping);
        assert_eq!(normalize_gce_status("SUSPENDED"), LifecycleState::NotRun);
        assert_eq!(normalize_gce_status("TERMINATED"), LifecycleState::NotRun);
    }

    #[test]
    fn gce_unknown_value_is_not_available() {
        assert_eq!(normalize_gce_status("DELETING"), LifecycleState::NotAvailable);
    }
}
