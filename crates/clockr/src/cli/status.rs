//! `clockr status`: today's locally recorded entries.

use anyhow::{Context, Result};
use chrono::Local;

use clockr::store::{EntryStatus, EntryStore, PersistedEntry, SqliteEntryStore};

#[derive(Debug, clap::Args)]
pub struct StatusArgs {}

pub async fn run(_args: StatusArgs) -> Result<()> {
    let home = clockr_logging::clockr_home()?;
    let db_path = SqliteEntryStore::default_path(&home);
    let store = SqliteEntryStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    let today = store
        .today_entries()
        .await
        .context("Failed to read today's entries")?;
    let failed = store
        .failed_entries()
        .await
        .context("Failed to read failed entries")?;

    print!("{}", render(&today, failed.len()));
    Ok(())
}

fn render(entries: &[PersistedEntry], failed_total: usize) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        out.push_str("No entries logged today.\n");
    } else {
        out.push_str("Today's entries:\n\n");
        for entry in entries {
            let project = match entry.client_name.as_deref() {
                Some(client) if !client.is_empty() => format!("{} / {}", client, entry.project_name),
                _ => entry.project_name.clone(),
            };
            out.push_str(&format!(
                "  {}-{}  {}min  {:<30}  {}  [{}]\n",
                entry.start.with_timezone(&Local).format("%H:%M"),
                entry.end.with_timezone(&Local).format("%H:%M"),
                entry.minutes,
                project,
                entry.description,
                entry.status,
            ));
        }
        let total: u32 = entries.iter().map(|e| e.minutes).sum();
        out.push_str(&format!(
            "\nTotal: {}h {}min ({} entries)\n",
            total / 60,
            total % 60,
            entries.len()
        ));
    }

    if failed_total > 0 {
        let today_failed = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .count();
        out.push_str(&format!(
            "\n{} entries failed to reach Clockify ({} today); check the logs for details.\n",
            failed_total, today_failed
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(minutes: u32, status: EntryStatus) -> PersistedEntry {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        PersistedEntry {
            local_id: Some(1),
            external_id: String::new(),
            project_id: "p1".into(),
            project_name: "Backend".into(),
            client_name: Some("Acme".into()),
            description: "auth fix".into(),
            start,
            end: start + chrono::Duration::minutes(i64::from(minutes)),
            minutes,
            status,
            raw_input: "fixed auth bug".into(),
            created_at: start,
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[], 0), "No entries logged today.\n");
    }

    #[test]
    fn test_render_totals_and_failures() {
        let out = render(
            &[entry(60, EntryStatus::Logged), entry(45, EntryStatus::Failed)],
            3,
        );
        assert!(out.contains("Acme / Backend"));
        assert!(out.contains("[logged]"));
        assert!(out.contains("[failed]"));
        assert!(out.contains("Total: 1h 45min (2 entries)"));
        assert!(out.contains("3 entries failed to reach Clockify (1 today)"));
    }
}
