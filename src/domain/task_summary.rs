use crate::domain::calendar::CalendarContext;
use crate::domain::models::{Task, TaskStatus};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub completed_today: usize,
    pub pending: usize,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
}

impl TaskSummary {
    pub fn from_tasks(tasks: &[Task], calendar: &CalendarContext) -> Self {
        tasks.iter().fold(Self::default(), |mut summary, task| {
            summary.total += 1;
            match task.status {
                TaskStatus::Done => {
                    summary.completed += 1;
                    if calendar.is_today(task.updated_raw()) {
                        summary.completed_today += 1;
                    }
                }
                TaskStatus::InProgress => {
                    summary.in_progress += 1;
                    summary.pending += 1;
                }
                TaskStatus::Todo => {
                    summary.todo += 1;
                    summary.pending += 1;
                }
            }
            summary
        })
    }
}

impl fmt::Display for TaskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User summary:\n\
             - Completed today: {}\n\
             - Pending: {}\n\
             - Total tasks: {}\n\
             - Completed: {}\n\
             - In progress: {}\n\
             - Todo: {}",
            self.completed_today,
            self.pending,
            self.total,
            self.completed,
            self.in_progress,
            self.todo
        )
    }
}

pub fn generate_task_summary(tasks: &[Task], calendar: &CalendarContext) -> String {
    TaskSummary::from_tasks(tasks, calendar).to_string()
}
