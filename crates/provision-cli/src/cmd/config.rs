use crate::output::print_json;
use crate::settings::Settings;
use clap::Subcommand;
use provision_core::config::WarnLevel;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (file values over defaults)
    Show,

    /// Validate the config for common mistakes
    Check,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(settings: &Settings, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(settings),
        ConfigSubcommand::Check => check(settings),
    }
}

fn show(settings: &Settings) -> anyhow::Result<()> {
    if settings.json {
        return print_json(&settings.config);
    }
    let source = if settings.config_path.exists() {
        settings.config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", settings.config_path.display())
    };
    println!("# source: {source}");
    print!("{}", serde_yaml::to_string(&settings.config)?);
    Ok(())
}

fn check(settings: &Settings) -> anyhow::Result<()> {
    let warnings = settings.config.validate();

    if settings.json {
        let value = serde_json::json!({
            "path": settings.config_path,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
