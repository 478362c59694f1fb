//! CLI configuration: thin wrapper around `hbee_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--broker, --user, --timeout).

use hbee_config::ResolvedProfile;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use hbee_config::{
    Config, Profile, config_path, load_config_or_default, save_config, store_password,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Pick the active profile, apply flag overrides, and build the runtime
/// configuration.
///
/// Without a stored profile, `--broker` and `--user` alone are enough.
pub fn resolve(global: &GlobalOpts) -> Result<ResolvedProfile, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        None => {
            let (Some(broker), Some(user)) = (&global.broker, &global.user) else {
                return Err(CliError::NoConfig {
                    path: config_path().display().to_string(),
                });
            };
            Profile::new(broker.clone(), user.clone())
        }
    };

    apply_overrides(&mut profile, global);
    Ok(hbee_config::resolve_profile(&profile, &profile_name)?)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref broker) = global.broker {
        profile.broker.clone_from(broker);
    }
    if let Some(ref user) = global.user {
        profile.user_id.clone_from(user);
    }
    if let Some(timeout) = global.timeout {
        profile.connect_timeout_secs = timeout;
    }
}
