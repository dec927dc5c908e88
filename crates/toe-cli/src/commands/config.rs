use clap::Subcommand;
use std::path::PathBuf;
use toe_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// Section and field joined by a dot, e.g. "scheduler.min_gap_minutes",
        /// "prompt.timeout_minutes" or "categories.Deep Work.outlook_category"
        key: String,
    },
    /// Change one setting and save the file
    Set {
        /// Section and field, e.g. "replay.jitter_ms" or "work_window.end"
        key: String,
        /// Parsed as JSON when it can be ("45", "true"), else taken as text ("18:30")
        value: String,
    },
    /// Print the whole configuration as TOML
    Show,
    /// Check a config file without running anything
    Validate {
        /// File to check; defaults to the active config file
        path: Option<PathBuf>,
    },
    /// Overwrite the config file with the built-in defaults
    Reset,
    /// Print where the config file lives
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config
                .get(&key)
                .ok_or_else(|| format!("no setting named '{key}' (try `toe config show`)"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            let stored = config.get(&key).unwrap_or(value);
            tracing::debug!(%key, %stored, "setting saved");
            println!("{key} = {stored}");
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { path } => {
            let path = match path {
                Some(path) => path,
                None => Config::path()?,
            };
            let config = Config::load_from(&path)?;
            let window = config.work_window()?;
            println!(
                "{}: valid (work window {}-{} in {}-minute slots, {} categories)",
                path.display(),
                window.start.format("%H:%M"),
                window.end.format("%H:%M"),
                window.slot_minutes,
                config.categories.len()
            );
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("wrote defaults to {}", Config::path()?.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
