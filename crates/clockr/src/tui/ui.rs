//! Rendering for the review flow.

use chrono::{Datelike, Local};
use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Paragraph, Wrap},
};
use std::time::Duration;

use super::editor::AllocationEditor;
use super::review::{Confirmation, ReviewMachine};
use super::suggestions::{group_by_date, SuggestionReviewer};
use super::input::PLACEHOLDER;
use super::theme::Theme;
use crate::model::{EditableAllocation, ViewState};
use crate::schedule::weekday_name;
use crate::store::{EntryStatus, PersistedEntry};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const MAX_CANDIDATES: usize = 5;
const EXIT_HINT: &str = "Press any key to exit";

/// Draw the current view.
pub fn draw<A: EditableAllocation>(frame: &mut Frame, machine: &ReviewMachine<A>, theme: &Theme) {
    let area = frame.area();
    match machine.view() {
        ViewState::Input => draw_input(frame, machine, theme, area),
        ViewState::Loading => draw_loading(frame, machine, theme, area),
        ViewState::Suggestion => {
            if let Some(reviewer) = machine.reviewer() {
                draw_suggestions(frame, reviewer, theme, area);
            }
        }
        ViewState::Edit => {
            if let Some(editor) = machine.editor() {
                draw_editor(frame, editor, theme, area);
            }
        }
        ViewState::Confirmation => draw_confirmation::<A>(frame, machine.confirmation(), theme, area),
    }
}

/// "Xs" below a minute, "Xm Ys" above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

fn boxed<'a>(theme: &Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.title))
}

fn help<'a>(text: impl Into<String>, theme: &Theme) -> Line<'a> {
    Line::styled(text.into(), theme.dim())
}

// ============================================================================
// Input
// ============================================================================

fn draw_input<A: EditableAllocation>(
    frame: &mut Frame,
    machine: &ReviewMachine<A>,
    theme: &Theme,
    area: Rect,
) {
    let input = machine.input();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Title
            Constraint::Length(1), // Time window
            Constraint::Min(3),    // Text
            Constraint::Length(1), // Help
        ])
        .split(area);

    frame.render_widget(Paragraph::new(Span::styled("clockr · Time Entry", theme.title())), chunks[0]);
    frame.render_widget(Paragraph::new(Span::styled(input.time_label().to_string(), theme.dim())), chunks[1]);

    let body = if input.text().is_empty() {
        Paragraph::new(Span::styled(PLACEHOLDER, theme.dim()))
    } else {
        Paragraph::new(format!("{}▏", input.text())).wrap(Wrap { trim: false })
    };
    frame.render_widget(body.block(boxed(theme)), chunks[2]);

    let mut hint = String::from("Enter: submit • Alt+Enter: newline • Ctrl+C: cancel");
    if input.has_last_input() {
        hint.push_str(" • Ctrl+L: load last description");
    }
    let footer = if input.loaded_last() {
        Line::from(vec![
            Span::styled("Loaded last description  ", theme.success()),
            Span::styled(hint, theme.dim()),
        ])
    } else {
        help(hint, theme)
    };
    frame.render_widget(Paragraph::new(footer), chunks[3]);
}

// ============================================================================
// Loading
// ============================================================================

fn draw_loading<A: EditableAllocation>(
    frame: &mut Frame,
    machine: &ReviewMachine<A>,
    theme: &Theme,
    area: Rect,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    let elapsed = machine.elapsed();
    let frame_idx = elapsed.as_secs() as usize % SPINNER.len();
    let label = if A::DATED {
        "Thinking (batch mode, this may take a moment)..."
    } else {
        "Thinking..."
    };
    let header = Line::from(vec![
        Span::styled(format!("{} ", SPINNER[frame_idx]), theme.highlight()),
        Span::raw(label),
        Span::raw("  "),
        Span::styled(format_elapsed(elapsed), theme.dim()),
    ]);
    frame.render_widget(Paragraph::new(header), chunks[0]);
    frame.render_widget(
        Paragraph::new(Span::styled("─".repeat(area.width as usize), theme.dim())),
        chunks[1],
    );

    let transcript = machine.transcript();
    let scroll = bottom_scroll(transcript, chunks[2].width, chunks[2].height);
    frame.render_widget(
        Paragraph::new(transcript.to_string())
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0)),
        chunks[2],
    );
}

/// Scroll offset that keeps the last wrapped line visible.
fn bottom_scroll(text: &str, width: u16, height: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = text
        .split('\n')
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum();
    u16::try_from(rows.saturating_sub(usize::from(height))).unwrap_or(u16::MAX)
}

// ============================================================================
// Suggestions
// ============================================================================

fn allocation_line<'a, A: EditableAllocation>(
    alloc: &A,
    selected: bool,
    theme: &Theme,
) -> Line<'a> {
    let a = alloc.allocation();
    let prefix = if selected { "> " } else { "  " };
    let base = if selected { theme.highlight() } else { Style::default() };
    let percent = a.confidence_percent();

    let mut spans = if A::DATED {
        vec![Span::styled(format!("{}{:<20}  {:>3}min  ", prefix, a.display_project(), a.minutes), base)]
    } else {
        vec![Span::styled(format!("{}{:<30}  {:>3}min  ", prefix, a.display_project(), a.minutes), base)]
    };
    spans.push(Span::styled(format!("{:>3}%", percent), theme.confidence(percent)));
    if let Some((start, end)) = alloc.time_window() {
        spans.push(Span::styled(format!("  {}–{}", start, end), base));
    }
    spans.push(Span::styled(format!("  {}", a.description), base));
    Line::from(spans)
}

fn draw_suggestions<A: EditableAllocation>(
    frame: &mut Frame,
    reviewer: &SuggestionReviewer<A>,
    theme: &Theme,
    area: Rect,
) {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(question) = reviewer.clarification() {
        lines.push(Line::from(vec![
            Span::styled("Clarification needed: ", theme.warning()),
            Span::raw(question.to_string()),
        ]));
        lines.push(Line::default());
        lines.push(help("[r]etry with more detail • [s]kip", theme));
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
        return;
    }

    let allocations = reviewer.allocations();
    let title = if A::DATED { "Suggested Batch Allocations" } else { "Suggested Allocations" };
    lines.push(Line::styled(title, theme.title()));
    lines.push(Line::default());

    let mut selected_line = 0;
    if A::DATED {
        let mut position = 0;
        for group in group_by_date(allocations) {
            lines.push(Line::styled(group.header(), theme.dim()));
            for idx in group.indices {
                let selected = position == reviewer.cursor();
                if selected {
                    selected_line = lines.len();
                }
                lines.push(allocation_line(&allocations[idx], selected, theme));
                position += 1;
            }
        }
    } else {
        for (idx, alloc) in allocations.iter().enumerate() {
            let selected = idx == reviewer.cursor();
            if selected {
                selected_line = lines.len();
            }
            lines.push(allocation_line(alloc, selected, theme));
        }
    }

    let accept = if A::DATED { "[a]ccept all" } else { "[a]ccept" };
    let footer = vec![
        Line::default(),
        help(format!("{} • [e]dit • [r]etry • [s]kip", accept), theme),
    ];
    draw_scrolled(frame, lines, selected_line, footer, theme, area);
}

/// Render a boxed list whose footer stays pinned while the list scrolls to `selected_line`.
fn draw_scrolled(
    frame: &mut Frame,
    lines: Vec<Line>,
    selected_line: usize,
    footer: Vec<Line>,
    theme: &Theme,
    area: Rect,
) {
    let block = boxed(theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let footer_height = u16::try_from(footer.len()).unwrap_or(u16::MAX);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(footer_height)])
        .split(inner);

    let scroll = cursor_scroll(selected_line, rows[0].height);
    frame.render_widget(Paragraph::new(lines).scroll((scroll, 0)), rows[0]);
    frame.render_widget(Paragraph::new(footer), rows[1]);
}

/// Scroll offset that keeps row `line` inside a viewport of `height` rows.
fn cursor_scroll(line: usize, height: u16) -> u16 {
    let height = usize::from(height.max(1));
    u16::try_from((line + 1).saturating_sub(height)).unwrap_or(u16::MAX)
}

// ============================================================================
// Editor
// ============================================================================

fn draw_editor<A: EditableAllocation>(
    frame: &mut Frame,
    editor: &AllocationEditor<A>,
    theme: &Theme,
    area: Rect,
) {
    let title = if A::DATED { "Edit Batch Allocations" } else { "Edit Allocations" };
    let mut lines: Vec<Line> = vec![Line::styled(title, theme.title()), Line::default()];

    let mut selected_line = 0;
    for (idx, alloc) in editor.allocations().iter().enumerate() {
        let a = alloc.allocation();
        let selected = idx == editor.cursor();
        let prefix = if selected { "> " } else { "  " };
        let date = alloc.date().map(|d| format!("{} ", d)).unwrap_or_default();
        let window = alloc
            .time_window()
            .map(|(s, e)| format!("  {}–{}", s, e))
            .unwrap_or_default();
        let text = format!(
            "{}{}{:<20}  {:>3}min{}  {}",
            prefix, date, a.project_name, a.minutes, window, a.description
        );
        let style = if selected { theme.highlight() } else { Style::default() };
        if selected {
            selected_line = lines.len();
        }
        lines.push(Line::styled(text, style));
    }

    let mut footer = vec![
        Line::default(),
        Line::from(vec![
            Span::raw("Field: "),
            Span::styled(editor.field().label(), theme.success().add_modifier(Modifier::BOLD)),
        ]),
    ];

    if let Some(buffer) = editor.buffer() {
        let field_line = if buffer.is_empty() {
            Line::styled(format!("> {}", editor.field().placeholder()), theme.dim())
        } else {
            Line::raw(format!("> {}▏", buffer))
        };
        footer.push(field_line);
        for project in editor.candidates().into_iter().take(MAX_CANDIDATES) {
            footer.push(Line::styled(format!("  {}", project.display_name()), theme.dim()));
        }
    }

    footer.push(Line::default());
    footer.push(help(
        "Enter: edit field • Tab: next field • j/k: nav • Esc: done editing",
        theme,
    ));

    draw_scrolled(frame, lines, selected_line, footer, theme, area);
}

// ============================================================================
// Confirmation
// ============================================================================

/// Per-day entry count and minutes, in order of first appearance.
pub fn day_breakdown(entries: &[PersistedEntry]) -> Vec<(String, usize, u32)> {
    let mut days: Vec<(String, usize, u32)> = Vec::new();
    for entry in entries {
        let date = entry.start.with_timezone(&Local).date_naive();
        let label = format!("{} {}", date.format("%Y-%m-%d"), weekday_name(date.weekday()));
        match days.iter_mut().find(|(d, _, _)| *d == label) {
            Some(day) => {
                day.1 += 1;
                day.2 += entry.minutes;
            }
            None => days.push((label, 1, entry.minutes)),
        }
    }
    days
}

/// "Logged N entries" with the failure count appended when non-zero.
pub fn summary_line(entries: &[PersistedEntry], dated: bool) -> String {
    let failed = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Failed)
        .count();
    let logged = entries.len() - failed;
    let mut line = format!("Logged {} entries", logged);
    if dated {
        line.push_str(&format!(" across {} days", day_breakdown(entries).len()));
    }
    if failed > 0 {
        line.push_str(&format!(" ({} failed)", failed));
    }
    line
}

fn draw_confirmation<A: EditableAllocation>(
    frame: &mut Frame,
    confirmation: Option<&Confirmation>,
    theme: &Theme,
    area: Rect,
) {
    let mut lines: Vec<Line> = Vec::new();
    match confirmation {
        None | Some(Confirmation::Pending) => {
            lines.push(Line::styled("Submitting entries...", theme.warning()));
        }
        Some(Confirmation::Failed(message)) => {
            lines.push(Line::from(vec![
                Span::styled("Error: ", theme.error()),
                Span::raw(message.clone()),
            ]));
            lines.push(Line::default());
            lines.push(help(EXIT_HINT, theme));
        }
        Some(Confirmation::Done(entries)) if entries.is_empty() => {
            lines.push(Line::styled("No entries to log.", theme.success()));
            lines.push(Line::default());
            lines.push(help(EXIT_HINT, theme));
        }
        Some(Confirmation::Done(entries)) => {
            let has_failures = entries.iter().any(|e| e.status == EntryStatus::Failed);
            let style = if has_failures { theme.warning() } else { theme.success() };
            lines.push(Line::styled(summary_line(entries, A::DATED), style));
            lines.push(Line::default());
            if A::DATED {
                for (day, count, minutes) in day_breakdown(entries) {
                    lines.push(Line::raw(format!("  {}: {} entries, {} min", day, count, minutes)));
                }
                lines.push(Line::default());
            }
            lines.push(help(EXIT_HINT, theme));
        }
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::ProjectIndex;
    use crate::model::{Allocation, BatchAllocation, Proposal};
    use crate::tui::review::Msg;
    use chrono::{TimeZone, Utc};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    fn render<A: EditableAllocation>(machine: &ReviewMachine<A>) -> String {
        render_sized(machine, 100, 30)
    }

    fn render_sized<A: EditableAllocation>(machine: &ReviewMachine<A>, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal
            .draw(|frame| draw(frame, machine, &Theme::default()))
            .unwrap();
        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn alloc(name: &str, minutes: u32, confidence: f64) -> Allocation {
        Allocation {
            project_id: name.to_lowercase(),
            project_name: name.into(),
            client_name: None,
            minutes,
            description: format!("{} work", name),
            confidence,
        }
    }

    fn entry(status: EntryStatus, hour: u32, minutes: u32) -> PersistedEntry {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, hour, 0, 0).unwrap();
        PersistedEntry {
            local_id: None,
            external_id: String::new(),
            project_id: "p".into(),
            project_name: "P".into(),
            client_name: None,
            description: "d".into(),
            start,
            end: start,
            minutes,
            status,
            raw_input: String::new(),
            created_at: start,
        }
    }

    fn press<A: EditableAllocation>(m: &mut ReviewMachine<A>, code: KeyCode) {
        m.update(Msg::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    }

    fn start<A: EditableAllocation>(label: &str) -> ReviewMachine<A> {
        let mut m = ReviewMachine::new(label, Arc::new(ProjectIndex::default()))
            .with_initial_input("fixed auth bug");
        press(&mut m, KeyCode::Enter);
        m
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0s");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "59s");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1m 15s");
    }

    #[test]
    fn test_bottom_scroll() {
        assert_eq!(bottom_scroll("a\nb\nc", 10, 5), 0);
        assert_eq!(bottom_scroll("a\nb\nc\nd", 10, 2), 2);
        assert_eq!(bottom_scroll(&"x".repeat(25), 10, 1), 2);
    }

    #[test]
    fn test_cursor_scroll() {
        assert_eq!(cursor_scroll(0, 10), 0);
        assert_eq!(cursor_scroll(9, 10), 0);
        assert_eq!(cursor_scroll(10, 10), 1);
        assert_eq!(cursor_scroll(41, 21), 21);
        assert_eq!(cursor_scroll(3, 0), 3);
    }

    fn month_of_batches() -> Vec<BatchAllocation> {
        (0..30)
            .map(|i| BatchAllocation {
                date: format!("2025-03-{:02}", 3 + i / 3),
                start_time: "09:00".into(),
                end_time: "12:00".into(),
                allocation: alloc(&format!("Proj{:02}", i), 180, 0.8),
            })
            .collect()
    }

    #[test]
    fn test_long_batch_list_follows_cursor() {
        let mut m: ReviewMachine<BatchAllocation> = start("Batch");
        m.update(Msg::Matched(Ok(Proposal::with_allocations(month_of_batches()))));
        for _ in 0..29 {
            press(&mut m, KeyCode::Char('j'));
        }

        let screen = render_sized(&m, 100, 24);
        assert!(screen.contains("> Proj29"), "{screen}");
        assert!(screen.contains("[a]ccept all • [e]dit • [r]etry • [s]kip"), "{screen}");
        assert!(!screen.contains("Proj00"));
    }

    #[test]
    fn test_long_edit_list_follows_cursor() {
        let mut m: ReviewMachine<BatchAllocation> = start("Batch");
        m.update(Msg::Matched(Ok(Proposal::with_allocations(month_of_batches()))));
        press(&mut m, KeyCode::Char('e'));
        for _ in 0..29 {
            press(&mut m, KeyCode::Char('j'));
        }

        let screen = render_sized(&m, 100, 24);
        assert!(screen.contains("> 2025-03-12 Proj29"), "{screen}");
        assert!(screen.contains("Field: Project"));
        assert!(screen.contains("Esc: done editing"), "{screen}");
    }

    #[test]
    fn test_input_view() {
        let m: ReviewMachine<Allocation> =
            ReviewMachine::new("09:00 – 10:00 (60 min)", Arc::new(ProjectIndex::default()))
                .with_last_input("yesterday's notes");
        let screen = render(&m);
        assert!(screen.contains("09:00 – 10:00 (60 min)"));
        assert!(screen.contains(PLACEHOLDER));
        assert!(screen.contains("Ctrl+L"));
    }

    #[test]
    fn test_loading_view_shows_elapsed_and_transcript() {
        let mut m: ReviewMachine<Allocation> = start("label");
        for _ in 0..65 {
            m.update(Msg::Tick);
        }
        m.update(Msg::Thinking("Matching against Auth".into()));
        let screen = render(&m);
        assert!(screen.contains("Thinking..."));
        assert!(screen.contains("1m 5s"));
        assert!(screen.contains("Matching against Auth"));
    }

    #[test]
    fn test_single_suggestions_view() {
        let mut m: ReviewMachine<Allocation> = start("label");
        m.update(Msg::Matched(Ok(Proposal::with_allocations(vec![
            alloc("Auth", 60, 0.9),
            alloc("Billing", 30, 0.4),
        ]))));
        let screen = render(&m);
        assert!(screen.contains("Suggested Allocations"));
        assert!(screen.contains("> Auth"));
        assert!(screen.contains(" 90%"));
        assert!(screen.contains("[a]ccept • [e]dit • [r]etry • [s]kip"));
    }

    #[test]
    fn test_clarification_view() {
        let mut m: ReviewMachine<Allocation> = start("label");
        m.update(Msg::Matched(Ok(Proposal::clarify("Which client was this for?"))));
        let screen = render(&m);
        assert!(screen.contains("Clarification needed: Which client was this for?"));
        assert!(screen.contains("[r]etry with more detail • [s]kip"));
        assert!(!screen.contains("[a]ccept"));
    }

    #[test]
    fn test_batch_suggestions_grouped_by_day() {
        let mut m: ReviewMachine<BatchAllocation> = start("Batch");
        let day = |date: &str, start: &str, end: &str, minutes| BatchAllocation {
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            allocation: alloc("Auth", minutes, 0.8),
        };
        m.update(Msg::Matched(Ok(Proposal::with_allocations(vec![
            day("2025-03-03", "09:00", "13:00", 240),
            day("2025-03-03", "13:00", "17:00", 240),
            day("2025-03-04", "09:00", "17:00", 480),
        ]))));
        let screen = render(&m);
        assert!(screen.contains("Mon 2025-03-03 (480 min)"));
        assert!(screen.contains("Tue 2025-03-04 (480 min)"));
        assert!(screen.contains("09:00–13:00"));
        assert!(screen.contains("[a]ccept all"));
    }

    #[test]
    fn test_edit_view_lists_candidates() {
        let projects = Arc::new(ProjectIndex::new(vec![
            crate::model::Project::new("p1", "Auth"),
            crate::model::Project::new("p2", "Billing").with_client("Acme"),
        ]));
        let mut m: ReviewMachine<Allocation> =
            ReviewMachine::new("label", projects).with_initial_input("x");
        press(&mut m, KeyCode::Enter);
        m.update(Msg::Matched(Ok(Proposal::with_allocations(vec![alloc("Auth", 60, 0.9)]))));
        press(&mut m, KeyCode::Char('e'));
        press(&mut m, KeyCode::Enter);
        let screen = render(&m);
        assert!(screen.contains("Edit Allocations"));
        assert!(screen.contains("Field: Project"));
        assert!(screen.contains("Search project..."));
        assert!(screen.contains("Acme / Billing"));
    }

    #[test]
    fn test_error_confirmation() {
        let mut m: ReviewMachine<Allocation> = start("label");
        m.update(Msg::Matched(Err(crate::ai::AiError::NotFound)));
        let screen = render(&m);
        assert!(screen.contains("Error: claude CLI not found"));
        assert!(screen.contains(EXIT_HINT));
    }

    #[test]
    fn test_summary_counts_failures() {
        let entries = vec![
            entry(EntryStatus::Logged, 9, 60),
            entry(EntryStatus::Failed, 10, 60),
            entry(EntryStatus::Logged, 11, 60),
        ];
        assert_eq!(summary_line(&entries, false), "Logged 2 entries (1 failed)");
        assert_eq!(summary_line(&entries[..1], false), "Logged 1 entries");
    }

    #[test]
    fn test_day_breakdown_sums_minutes() {
        let entries = vec![entry(EntryStatus::Logged, 12, 60), entry(EntryStatus::Logged, 12, 90)];
        let days = day_breakdown(&entries);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].1, 2);
        assert_eq!(days[0].2, 150);
    }
}
