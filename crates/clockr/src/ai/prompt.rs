//! Prompt and JSON schema construction for project matching.

use serde_json::{json, Value};
use std::fmt::Write as _;

use super::{BatchMatchRequest, SingleMatchRequest};
use crate::model::{DaySlot, Project};

/// Minimum length of a single allocation, in minutes.
pub const MIN_ALLOCATION_MINUTES: u32 = 30;

/// Prompt pair plus the schema the response must satisfy.
#[derive(Debug, Clone)]
pub struct MatchPrompt {
    pub system: String,
    pub user: String,
    pub schema: Value,
}

impl MatchPrompt {
    pub fn single(request: &SingleMatchRequest) -> Self {
        Self {
            system: single_system_prompt(request),
            user: user_prompt(&request.description),
            schema: single_schema(),
        }
    }

    pub fn batch(request: &BatchMatchRequest) -> Self {
        Self {
            system: batch_system_prompt(request),
            user: user_prompt(&request.description),
            schema: batch_schema(),
        }
    }
}

pub fn user_prompt(description: &str) -> String {
    format!("What I worked on: {}", description.trim())
}

fn project_catalog(projects: &[Project]) -> String {
    serde_json::to_string(projects).unwrap_or_else(|_| "[]".to_string())
}

fn single_system_prompt(request: &SingleMatchRequest) -> String {
    let total = request.interval_minutes;
    let mut prompt = String::from(
        "You are a time-tracking assistant. Match the user's work description to \
         Clockify projects and split the time period into time entry allocations.\n\n",
    );
    let _ = writeln!(prompt, "Available projects:\n{}", project_catalog(&request.projects));

    if !request.context_items.is_empty() {
        prompt.push_str("\nContext (calendar events, commits, PRs):\n");
        for item in &request.context_items {
            let _ = writeln!(prompt, "  - {}", item);
        }
    }

    let _ = write!(
        prompt,
        "\nRules:\n\
         - The time period is {total} minutes total\n\
         - Each allocation must be at least {min} minutes\n\
         - Use at most 2 allocations per hour\n\
         - Allocations must sum to exactly {total} minutes\n\
         - Use project IDs and names exactly as listed above\n\
         - Write concise, professional descriptions suitable for time entries\n\
         - Treat commits and PRs as hints about which project was worked on\n\
         - If the description is unclear, ask for detail in clarification and return no allocations\n\
         - Set confidence between 0 and 1 for how well the description matches the project\n\
         - If no project matches with reasonable confidence, explain why in clarification\n\n\
         Return valid JSON matching the required schema.",
        total = total,
        min = MIN_ALLOCATION_MINUTES,
    );
    prompt
}

fn schedule_line(day: &DaySlot) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            format!("[{}]", items.join(" "))
        }
    };
    format!(
        "  {} {}: {}–{} ({} min), calendar: {}, commits: {}",
        day.date_string(),
        day.weekday,
        day.work_start.format("%H:%M"),
        day.work_end.format("%H:%M"),
        day.total_minutes,
        list(&day.calendar_events),
        list(&day.commit_context),
    )
}

fn batch_system_prompt(request: &BatchMatchRequest) -> String {
    let mut prompt = String::from(
        "You are a time-tracking assistant. Match the user's work description to \
         Clockify projects and create time entry allocations across several days.\n\n",
    );
    let _ = writeln!(prompt, "Available projects:\n{}\n", project_catalog(&request.projects));
    prompt.push_str("Work schedule:\n");
    for day in &request.days {
        let _ = writeln!(prompt, "{}", schedule_line(day));
    }

    let _ = write!(
        prompt,
        "\nRules:\n\
         - Create allocations for every work day listed above\n\
         - Each day's allocations must sum to exactly that day's total minutes\n\
         - Each allocation must be at least {min} minutes\n\
         - Allocations within a day must be contiguous inside work hours, without gaps or overlaps\n\
         - Use project IDs and names exactly as listed above\n\
         - \"date\" must use YYYY-MM-DD\n\
         - \"start_time\" and \"end_time\" must use 24h HH:MM\n\
         - Write concise, professional descriptions suitable for time entries\n\
         - Treat calendar events, commits and PRs as hints about what was worked on\n\
         - If the description is unclear, ask for detail in clarification and return no allocations\n\
         - Set confidence between 0 and 1 for how well the description matches the project\n\n\
         Return valid JSON matching the required schema.",
        min = MIN_ALLOCATION_MINUTES,
    );
    prompt
}

fn allocation_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert("project_id".into(), json!({"type": "string"}));
    props.insert("project_name".into(), json!({"type": "string"}));
    props.insert("client_name".into(), json!({"type": "string"}));
    props.insert("minutes".into(), json!({"type": "integer"}));
    props.insert("description".into(), json!({"type": "string"}));
    props.insert("confidence".into(), json!({"type": "number"}));
    props
}

fn wrap_schema(item_properties: serde_json::Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "allocations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": item_properties,
                    "required": required,
                }
            },
            "clarification": {"type": "string"}
        },
        "required": ["allocations"]
    })
}

pub fn single_schema() -> Value {
    wrap_schema(
        allocation_properties(),
        &["project_id", "project_name", "minutes", "description", "confidence"],
    )
}

pub fn batch_schema() -> Value {
    let mut props = allocation_properties();
    props.insert("date".into(), json!({"type": "string"}));
    props.insert("start_time".into(), json!({"type": "string"}));
    props.insert("end_time".into(), json!({"type": "string"}));
    wrap_schema(
        props,
        &[
            "date",
            "start_time",
            "end_time",
            "project_id",
            "project_name",
            "minutes",
            "description",
            "confidence",
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn projects() -> Vec<Project> {
        vec![
            Project::new("p1", "Auth").with_client("Acme"),
            Project::new("p2", "Internal"),
        ]
    }

    #[test]
    fn test_single_prompt_embeds_catalog_and_rules() {
        let request = SingleMatchRequest {
            description: "  fixed auth bug ".into(),
            projects: projects(),
            interval_minutes: 90,
            context_items: vec!["commit: fix token refresh".into()],
        };
        let prompt = MatchPrompt::single(&request);

        assert!(prompt.system.contains(r#""id":"p1""#));
        assert!(prompt.system.contains(r#""client_name":"Acme""#));
        assert!(prompt.system.contains("90 minutes total"));
        assert!(prompt.system.contains("  - commit: fix token refresh"));
        assert_eq!(prompt.user, "What I worked on: fixed auth bug");
    }

    #[test]
    fn test_single_prompt_without_context() {
        let request = SingleMatchRequest {
            description: "x".into(),
            projects: projects(),
            interval_minutes: 60,
            context_items: vec![],
        };
        assert!(!MatchPrompt::single(&request).system.contains("Context ("));
    }

    #[test]
    fn test_batch_prompt_lists_days() {
        let day = DaySlot {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            weekday: "Monday".into(),
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            total_minutes: 480,
            calendar_events: vec!["Standup".into()],
            commit_context: vec![],
        };
        let request = BatchMatchRequest {
            description: "week of auth work".into(),
            projects: projects(),
            days: vec![day],
        };
        let prompt = MatchPrompt::batch(&request);
        assert!(prompt
            .system
            .contains("2025-03-03 Monday: 09:00–17:00 (480 min), calendar: [Standup], commits: none"));
    }

    #[test]
    fn test_schemas_require_expected_fields() {
        let single = single_schema();
        let required = &single["properties"]["allocations"]["items"]["required"];
        assert_eq!(required.as_array().unwrap().len(), 5);

        let batch = batch_schema();
        let props = &batch["properties"]["allocations"]["items"]["properties"];
        assert!(props.get("start_time").is_some());
        assert_eq!(batch["required"], json!(["allocations"]));
    }
}
