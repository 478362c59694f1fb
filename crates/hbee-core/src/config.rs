// ── Runtime client configuration ──
//
// These types describe *how* the client behaves once it has a broker:
// who it acts for, how it retries, and how it paces startup traffic.
// They never touch disk; hbee-config builds them from profiles.

use std::collections::BTreeSet;
use std::time::Duration;

use hbee_api::QoS;

/// Whose traffic this client is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// The logged-in account.
    pub user_id: String,
    /// Secondary accounts whose devices this user may also watch.
    pub permitted_ids: BTreeSet<String>,
    /// When non-empty, only these device ids are accepted.
    pub known_devices: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn permits_owner(&self, owner_id: &str) -> bool {
        owner_id == self.user_id || self.permitted_ids.contains(owner_id)
    }

    pub fn permits_device(&self, device_id: &str) -> bool {
        self.known_devices.is_empty() || self.known_devices.contains(device_id)
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt 1.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Attempts before giving up. 0 disables reconnection.
    pub max_attempts: u32,
    /// How often to re-check connectivity while the network is offline.
    pub offline_recheck: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
            offline_recheck: Duration::from_millis(5_000),
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^(attempt - 1), max)`, with `attempt` starting at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthPolicy {
    /// How often a connected session is checked. Zero disables the check.
    pub interval: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Backend readiness polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    pub retry_interval: Duration,
    pub max_retries: u32,
    /// Poll interval of the background readiness monitor.
    pub monitor_interval: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(2),
            max_retries: 10,
            monitor_interval: Duration::from_secs(10),
        }
    }
}

/// Pacing and limits for the startup synchronization handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    /// When false the guard is bypassed entirely.
    pub enabled: bool,
    /// Delay after connect before settings are requested.
    pub settings_delay: Duration,
    /// Delay after connect before status is requested.
    pub status_delay: Duration,
    /// Minimum spacing between two attempts.
    pub cooldown: Duration,
    pub max_attempts: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            settings_delay: Duration::from_millis(500),
            status_delay: Duration::from_millis(2_000),
            cooldown: Duration::from_millis(5_000),
            max_attempts: 3,
        }
    }
}

/// Everything the connection manager needs besides the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub access: AccessPolicy,
    pub reconnect: ReconnectPolicy,
    pub health: HealthPolicy,
    pub probe: ProbePolicy,
    pub sync: SyncPolicy,
    /// QoS used for subscriptions and outbound commands.
    pub qos: QoS,
}

impl ClientConfig {
    pub fn new(access: AccessPolicy) -> Self {
        Self {
            access,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=6).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![5_000, 10_000, 20_000, 30_000, 30_000, 30_000]);
    }

    #[test]
    fn backoff_survives_huge_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
        assert_eq!(policy.delay_for(0), policy.base_delay);
    }

    #[test]
    fn access_policy_owner_and_device() {
        let mut access = AccessPolicy::new("alice");
        access.permitted_ids.insert("bob".into());
        assert!(access.permits_owner("alice"));
        assert!(access.permits_owner("bob"));
        assert!(!access.permits_owner("mallory"));

        assert!(access.permits_device("anything"));
        access.known_devices.insert("ab12cd34ef56".into());
        assert!(access.permits_device("ab12cd34ef56"));
        assert!(!access.permits_device("ffffffffffff"));
    }
}
