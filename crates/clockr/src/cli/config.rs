//! `clockr config`: show the resolved configuration.

use anyhow::Result;
use std::path::Path;

use clockr::config::Config;
use clockr::store::SqliteEntryStore;

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Show the resolved configuration in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs) -> Result<()> {
    let (config, path) = super::load_config()?;
    let home = clockr_logging::clockr_home()?;
    let db_path = SqliteEntryStore::default_path(&home);
    let logs = clockr_logging::logs_dir()?;

    if args.json {
        let output = serde_json::json!({
            "path": path.to_string_lossy(),
            "exists": path.exists(),
            "database": db_path.to_string_lossy(),
            "logs": logs.to_string_lossy(),
            "config": config.redacted(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print!("{}", render(&config, &path, &db_path, &logs));
    Ok(())
}

fn exists_label(path: &Path) -> &'static str {
    if path.exists() {
        "exists"
    } else {
        "not found, using defaults"
    }
}

fn render(config: &Config, path: &Path, db_path: &Path, logs: &Path) -> String {
    let mut out = String::new();
    out.push_str("CLOCKR CONFIGURATION\n");
    out.push_str("====================\n\n");
    out.push_str(&format!("File:      {} ({})\n", path.display(), exists_label(path)));
    out.push_str(&format!("Database:  {}\n", db_path.display()));
    out.push_str(&format!("Logs:      {}\n\n", logs.display()));

    out.push_str("[clockify]\n");
    out.push_str(&format!("  api_key:          {}\n", config.masked_key()));
    out.push_str(&format!(
        "  workspace_id:     {}\n",
        config.workspace_id().unwrap_or("(user default)")
    ));
    out.push_str(&format!(
        "  base_url:         {}\n\n",
        config.base_url().unwrap_or(clockr::clockify::DEFAULT_BASE_URL)
    ));

    let schedule = &config.schedule;
    let days: Vec<String> = schedule.work_days.iter().map(|d| d.to_string()).collect();
    out.push_str("[schedule]\n");
    out.push_str(&format!("  interval_minutes: {}\n", schedule.interval_minutes));
    out.push_str(&format!(
        "  work hours:       {} - {}\n",
        schedule.work_start, schedule.work_end
    ));
    out.push_str(&format!("  work_days:        [{}]\n\n", days.join(", ")));

    out.push_str("[ai]\n");
    out.push_str(&format!("  provider:         {}\n", config.ai.provider));
    out.push_str(&format!("  binary:           {}\n", config.ai.binary));
    out.push_str(&format!("  model:            {}\n", config.ai.model));
    out
}
