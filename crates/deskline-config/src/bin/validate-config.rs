//! Config validation CLI tool
//!
//! Validates a deskline configuration file and reports any errors.

use deskline_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a deskline configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match deskline_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", deskline_config::CURRENT_CONFIG_VERSION);
            println!("  Agents: {}", policy.agents.len());
            println!("  Categories: {}", policy.categories.len());
            println!("  Business windows: {}", policy.calendar.windows.len());
            println!("  Holidays: {}", policy.calendar.holidays.len());

            println!();
            println!("SLA policies:");
            for sla in &policy.sla_policies {
                println!(
                    "  - {}{}: respond {}, resolve {}{}",
                    sla.id,
                    if sla.is_default { " (default)" } else { "" },
                    format_duration(sla.response_time),
                    format_duration(sla.resolution_time),
                    if sla.business_hours_only { ", business hours" } else { "" },
                );
            }

            if !policy.rules.is_empty() {
                println!();
                println!("Rules (evaluation order):");
                for rule in &policy.rules {
                    println!(
                        "  - {} [{} / priority {}{}]: {} condition(s), {} action(s)",
                        rule.id,
                        rule.trigger,
                        rule.priority,
                        if rule.active { "" } else { ", inactive" },
                        rule.conditions.len(),
                        rule.actions.len(),
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                deskline_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                deskline_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                deskline_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                deskline_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        deskline_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
