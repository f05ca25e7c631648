//! `clockr projects`: list active Clockify projects.

use anyhow::{Context, Result};

use clockr::model::Project;

#[derive(Debug, clap::Args)]
pub struct ProjectsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ProjectsArgs) -> Result<()> {
    let (config, path) = super::load_config()?;
    let (client, workspace_id) = super::connect(&config, &path).await?;
    let projects = client
        .projects(&workspace_id)
        .await
        .context("Failed to fetch projects")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
    } else {
        print!("{}", render(&projects));
    }
    Ok(())
}

fn render(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects found.\n".to_string();
    }
    let mut out = format!("Found {} projects:\n\n", projects.len());
    for project in projects {
        out.push_str(&format!("  {}  {}\n", project.id, project.display_name()));
    }
    out
}
