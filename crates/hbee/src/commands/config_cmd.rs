//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking the password.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "broker = \"{}\"", p.broker);
        let _ = writeln!(out, "user_id = \"{}\"", p.user_id);
        if let Some(ref u) = p.username {
            let _ = writeln!(out, "username = \"{u}\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"****\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if !p.permitted_ids.is_empty() {
            let _ = writeln!(out, "permitted_ids = {:?}", p.permitted_ids);
        }
        if !p.devices.is_empty() {
            let _ = writeln!(out, "devices = {:?}", p.devices);
        }
        if let Some(ref url) = p.status_url {
            let _ = writeln!(out, "status_url = \"{url}\"");
        }
        let _ = writeln!(out, "keep_alive_secs = {}", p.keep_alive_secs);
        let _ = writeln!(out, "connect_timeout_secs = {}", p.connect_timeout_secs);
    }

    out
}

fn save_config(cfg: &Config) -> Result<(), CliError> {
    config::save_config(cfg)?;
    Ok(())
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str, hint: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: key.into(),
        reason: format!("must be {hint}"),
    })
}

/// Apply `key = value` to `profile`.
pub fn set_profile_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "broker" => profile.broker = value,
        "user_id" | "user-id" | "user" => profile.user_id = value,
        "username" => profile.username = Some(value),
        "password_env" | "password-env" => profile.password_env = Some(value),
        "client_id" | "client-id" => profile.client_id = Some(value),
        "permitted_ids" | "permitted-ids" => profile.permitted_ids = split_list(&value),
        "devices" => profile.devices = split_list(&value),
        "restrict_to_devices" | "restrict-to-devices" => {
            profile.restrict_to_devices = parse_field(key, &value, "'true' or 'false'")?;
        }
        "status_url" | "status-url" => profile.status_url = Some(value),
        "keep_alive_secs" | "keep-alive" => {
            profile.keep_alive_secs = parse_field(key, &value, "a number (seconds)")?;
        }
        "connect_timeout_secs" | "timeout" => {
            profile.connect_timeout_secs = parse_field(key, &value, "a number (seconds)")?;
        }
        "clean_session" | "clean-session" => {
            profile.clean_session = parse_field(key, &value, "'true' or 'false'")?;
        }
        "health_check_secs" | "health-check" => {
            profile.health_check_secs = parse_field(key, &value, "a number (seconds, 0 disables)")?;
        }
        "reconnect.max_attempts" => {
            profile.reconnect.max_attempts = parse_field(key, &value, "a whole number")?;
        }
        "sync.enabled" => {
            profile.sync.enabled = parse_field(key, &value, "'true' or 'false'")?;
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: broker, user_id, username, \
                     password_env, client_id, permitted_ids, devices, restrict_to_devices, \
                     status_url, keep_alive_secs, connect_timeout_secs, clean_session, \
                     health_check_secs, reconnect.max_attempts, sync.enabled"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            if config_path.exists() && !global.yes {
                if !std::io::stdin().is_terminal() {
                    return Err(CliError::NonInteractiveRequiresYes {
                        action: "overwrite config".into(),
                    });
                }
                let overwrite = Confirm::new()
                    .with_prompt(format!("{} exists. Overwrite?", config_path.display()))
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?;
                if !overwrite {
                    return Ok(());
                }
            }

            eprintln!("HBEE CLI configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let broker: String = Input::new()
                .with_prompt("Broker URL")
                .default("wss://broker.example.com:8084/mqtt".into())
                .interact_text()
                .map_err(prompt_err)?;

            let user_id: String = Input::new()
                .with_prompt("Account id")
                .interact_text()
                .map_err(prompt_err)?;

            let mut profile = Profile::new(broker, user_id);

            let username: String = Input::new()
                .with_prompt("Broker username (blank for none)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;
            if !username.is_empty() {
                profile.username = Some(username);
                let password = rpassword::prompt_password("Broker password: ").map_err(prompt_err)?;
                if !password.is_empty() {
                    let choices = &[
                        "Store in system keyring (recommended)",
                        "Save to config file (plaintext)",
                    ];
                    let selection = Select::new()
                        .with_prompt("Where to store the password?")
                        .items(choices)
                        .default(0)
                        .interact()
                        .map_err(prompt_err)?;
                    if selection == 0 {
                        config::store_password(&profile_name, &password)?;
                        eprintln!("   Password stored in system keyring");
                    } else {
                        profile.password = Some(password);
                    }
                }
            }

            let devices: String = Input::new()
                .with_prompt("Device ids, comma-separated (blank to skip)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;
            profile.devices = split_list(&devices);

            let status_url: String = Input::new()
                .with_prompt("Backend status URL (blank to skip)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;
            if !status_url.is_empty() {
                profile.status_url = Some(status_url);
            }

            hbee_config::resolve_profile(&profile, &profile_name)?;

            let mut cfg = config::load_config_or_default();
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());
            save_config(&cfg)?;

            eprintln!("\nConfiguration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Test it: hbee watch --count 1");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg
                .profiles
                .entry(profile_name.clone())
                .or_insert_with(|| Profile::new(String::new(), String::new()));
            set_profile_key(profile, &key, value)?;

            save_config(&cfg)?;
            eprintln!("Set {key} on profile '{profile_name}'");
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: hbee config init");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();

            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
                available.sort();
                return Err(CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available.join(", ")
                    },
                });
            }

            cfg.default_profile = Some(name.clone());
            save_config(&cfg)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        // ── SetPassword ────────────────────────────────────────────
        ConfigCommand::SetPassword => {
            let cfg = config::load_config_or_default();
            let profile_name = config::active_profile_name(global, &cfg);
            let password = rpassword::prompt_password(format!("Password for '{profile_name}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            config::store_password(&profile_name, &password)?;
            eprintln!("Password for '{profile_name}' stored in system keyring");
            Ok(())
        }
    }
}
