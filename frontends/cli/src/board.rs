//! Plain-text wallboard
//!
//! Derives the dashboard panels from a [`PollState`] and renders them as
//! text. Nothing here feeds back into the poller.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use wallboard_clickup::{LoadStatus, PollState, Task};

pub const SUPPORT_TAG: &str = "Support";
pub const VULNERABILITY_TAG: &str = "Vulnerability";
pub const DOWNTIME_TAG: &str = "Downtime";
pub const URGENT_PRIORITY: &str = "urgent";

/// Shown where a task has no value for a column
const PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq)]
pub struct SupportRow {
    pub name: String,
    pub status: String,
    pub assignee: Option<String>,
    pub project: Option<String>,
    pub priority: String,
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub assignee: String,
    pub task_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardSummary {
    pub active: usize,
    pub support: usize,
    pub vulnerabilities: usize,
    pub downtime: usize,
    pub urgent: usize,
    pub overdue: usize,
    pub support_rows: Vec<SupportRow>,
    /// Keyed by the joined assignee names, in first-seen order
    pub workloads: Vec<Workload>,
}

impl BoardSummary {
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let active: Vec<&Task> = tasks.iter().filter(|task| !task.is_closed()).collect();
        let count_tagged = |tag: &str| active.iter().filter(|task| task.has_tag(tag)).count();

        let support_rows = active
            .iter()
            .filter(|task| task.has_tag(SUPPORT_TAG))
            .map(|task| SupportRow {
                name: task.name.clone(),
                status: task.status.label.clone(),
                assignee: task.assignee_display(),
                project: task.project_name.clone(),
                priority: task.priority.label.clone(),
                deadline: effective_deadline(task),
            })
            .collect();

        let mut workloads: Vec<Workload> = Vec::new();
        for task in &active {
            let Some(owner) = task.assignee_display() else {
                continue;
            };
            match workloads.iter_mut().find(|workload| workload.assignee == owner) {
                Some(workload) => workload.task_names.push(task.name.clone()),
                None => workloads.push(Workload {
                    assignee: owner,
                    task_names: vec![task.name.clone()],
                }),
            }
        }

        Self {
            active: active.len(),
            support: count_tagged(SUPPORT_TAG),
            vulnerabilities: count_tagged(VULNERABILITY_TAG),
            downtime: count_tagged(DOWNTIME_TAG),
            urgent: active
                .iter()
                .filter(|task| task.priority.label.eq_ignore_ascii_case(URGENT_PRIORITY))
                .count(),
            overdue: active
                .iter()
                .filter(|task| effective_deadline(task).is_some_and(|due| due < now))
                .count(),
            support_rows,
            workloads,
        }
    }
}

/// The deadline field when set, otherwise the task's own due date
fn effective_deadline(task: &Task) -> Option<DateTime<Utc>> {
    task.deadline.or(task.due_date)
}

fn format_deadline(deadline: Option<DateTime<Utc>>) -> String {
    deadline
        .map(|deadline| deadline.with_timezone(&Local).format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Render the whole board. Counts show a placeholder until a load succeeds.
pub fn render(state: &PollState, now: DateTime<Local>) -> String {
    Board { state, now }.to_string()
}

struct Board<'a> {
    state: &'a PollState,
    now: DateTime<Local>,
}

impl fmt::Display for Board<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state;
        let summary = BoardSummary::from_tasks(&state.tasks, self.now.with_timezone(&Utc));
        let loaded = state.status == LoadStatus::Success;
        let metric = |value: usize| {
            if loaded {
                value.to_string()
            } else {
                PLACEHOLDER.to_string()
            }
        };

        writeln!(f, "{}", self.now.format("%H:%M  %A, %B %-d, %Y"))?;
        writeln!(f)?;

        match (&state.status, &state.error) {
            (LoadStatus::Idle, _) | (LoadStatus::Loading, _) => writeln!(f, "Loading tasks...")?,
            (LoadStatus::Error, Some(error)) => writeln!(f, "Unable to load tasks: {}", error)?,
            _ => {}
        }

        writeln!(f, "Vulnerabilities      {}", metric(summary.vulnerabilities))?;
        writeln!(f, "Downtime follow-ups  {}", metric(summary.downtime))?;
        writeln!(f, "Urgent priority      {}", metric(summary.urgent))?;
        writeln!(f, "Overdue              {}", metric(summary.overdue))?;
        writeln!(f)?;

        writeln!(f, "Support tasks ({})", metric(summary.support))?;
        if loaded && summary.support_rows.is_empty() {
            writeln!(f, "  No open support tasks.")?;
        }
        for row in &summary.support_rows {
            writeln!(
                f,
                "  {} | {} | {} | {} | {} | {}",
                row.name,
                row.status,
                row.assignee.as_deref().unwrap_or(PLACEHOLDER),
                row.project.as_deref().unwrap_or(PLACEHOLDER),
                row.priority,
                format_deadline(row.deadline)
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Tasks by assignee")?;
        if loaded && summary.workloads.is_empty() {
            writeln!(f, "  No tasks available for the workload overview.")?;
        }
        for workload in &summary.workloads {
            writeln!(f, "  {} ({} tasks)", workload.assignee, workload.task_names.len())?;
            for name in &workload.task_names {
                writeln!(f, "    - {}", name)?;
            }
        }

        if let Some(updated) = state.last_updated {
            writeln!(f)?;
            writeln!(
                f,
                "Last updated {}",
                updated.with_timezone(&Local).format("%H:%M:%S")
            )?;
        }

        Ok(())
    }
}
