//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Password, Select};

use hearth_config::{self as config, Config, Profile, TokenStoreKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    Config {
        default_profile: cfg.default_profile.clone(),
        defaults: config::Defaults {
            output: cfg.defaults.output.clone(),
            color: cfg.defaults.color.clone(),
            ..cfg.defaults
        },
        profiles: cfg
            .profiles
            .iter()
            .map(|(name, p)| {
                let mut p = p.clone();
                if p.client_secret.is_some() {
                    p.client_secret = Some("****".into());
                }
                (name.clone(), p)
            })
            .collect(),
    }
}

/// Format config for display as TOML, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> Result<String, CliError> {
    toml_string(&redacted(cfg))
}

fn toml_string(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg)
        .map_err(config::ConfigError::from)
        .map_err(CliError::from)
}

fn prompt_text(prompt: &str, default: Option<&str>) -> Result<String, CliError> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_owned());
    }
    input.interact_text().map_err(prompt_err)
}

fn prompt_secret(profile_name: &str) -> Result<String, CliError> {
    let secret = Password::new()
        .with_prompt("Client secret")
        .interact()
        .map_err(prompt_err)?;
    if secret.is_empty() {
        return Err(CliError::Validation {
            field: "client_secret".into(),
            reason: format!("client secret for '{profile_name}' cannot be empty"),
        });
    }
    Ok(secret)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = match global.output {
                OutputFormat::Table => format_config_redacted(&cfg)?,
                OutputFormat::Json => output::render_json(&redacted(&cfg), false)?,
                OutputFormat::JsonCompact => output::render_json(&redacted(&cfg), true)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let active = cfg.profile_name(global.profile.as_deref());
            let mut out = String::new();
            for name in cfg.profiles.keys() {
                let marker = if *name == active { "*" } else { " " };
                let _ = writeln!(out, "{marker} {name}");
            }
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetSecret => {
            let cfg = config::load_config()?;
            let name = cfg.profile_name(global.profile.as_deref());
            cfg.profile(&name)?;
            let secret = prompt_secret(&name)?;
            config::store_client_secret(&name, &secret)?;
            eprintln!("✓ Client secret for '{name}' stored in system keyring");
            Ok(())
        }
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("hearth configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    let profile_name = prompt_text(
        "Profile name",
        Some(global.profile.as_deref().unwrap_or("default")),
    )?;
    let api_url = prompt_text("API base URL", None)?;
    let auth_url = prompt_text("Token exchange base URL", None)?;
    let authorize_url = prompt_text("Authorization page URL", None)?;
    let stream_url = prompt_text("Update stream URL (wss://...)", None)?;
    let client_id = prompt_text("OAuth client id", None)?;
    let redirect_url = prompt_text("Redirect URL (blank for PIN-style codes)", Some(""))?;

    let secret = prompt_secret(&profile_name)?;
    let secret_choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let client_secret = match Select::new()
        .with_prompt("Where to store the client secret?")
        .items(secret_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?
    {
        0 => {
            config::store_client_secret(&profile_name, &secret)?;
            eprintln!("   ✓ Client secret stored in system keyring");
            None
        }
        _ => Some(secret),
    };

    let token_choices = &["File in the data directory", "System keyring"];
    let token_store = match Select::new()
        .with_prompt("Where to keep the sign-in token?")
        .items(token_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?
    {
        0 => TokenStoreKind::File,
        _ => TokenStoreKind::Keyring,
    };

    let profile = Profile {
        api_url,
        auth_url,
        authorize_url,
        stream_url,
        client_id,
        client_secret,
        client_secret_env: None,
        redirect_url: Some(redirect_url).filter(|url| !url.trim().is_empty()),
        token_store: Some(token_store),
        ca_cert: None,
        insecure: None,
        timeout: None,
        pending_timeout: None,
    };

    // Reject bad URLs now rather than at the first login.
    config::profile_to_session_config(&profile, &profile_name, &cfg.defaults)?;

    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }
    config::save_config_to(&cfg, &config_path)?;

    eprintln!("\n✓ Configuration written to {}", config_path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Next: hearth login --profile {profile_name}");
    Ok(())
}
