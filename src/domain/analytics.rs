use crate::domain::calendar::CalendarContext;
use crate::domain::models::{Task, TaskStatus};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::str::FromStr;

const DAILY_TREND_DAYS: i64 = 7;
const WEEKLY_TREND_WEEKS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Today,
    Last7Days,
    ThisMonth,
    Custom { start: NaiveDate, end: NaiveDate },
}

impl DateWindow {
    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        match *self {
            Self::Today => DateRange { start: today, end: today },
            Self::Last7Days => DateRange {
                start: today - Duration::days(6),
                end: today,
            },
            Self::ThisMonth => DateRange {
                start: today.with_day(1).unwrap_or(today),
                end: today,
            },
            Self::Custom { start, end } => DateRange { start, end },
        }
    }
}

impl FromStr for DateWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "last7days" => Ok(Self::Last7Days),
            "thismonth" => Ok(Self::ThisMonth),
            other => Err(format!(
                "unknown date window '{other}' (expected today, last7days or thismonth)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyCompletion {
    pub date: NaiveDate,
    pub label: String,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeeklyTrend {
    pub week: String,
    pub range: DateRange,
    pub label: String,
    pub completed: usize,
    pub in_progress: usize,
    pub created: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSlice {
    pub status: TaskStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalyticsReport {
    pub range: DateRange,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub todo: usize,
    pub remaining: usize,
    pub completed_this_month: usize,
    pub efficiency: f64,
    pub overall_progress: f64,
    pub daily_completions: Vec<DailyCompletion>,
    pub weekly_trends: Vec<WeeklyTrend>,
    pub status_breakdown: Vec<StatusSlice>,
}

struct DatedTask<'a> {
    task: &'a Task,
    created: Option<NaiveDate>,
    updated: Option<NaiveDate>,
}

pub fn filter_tasks_by_range<'a>(
    tasks: &'a [Task],
    range: DateRange,
    calendar: &CalendarContext,
) -> Vec<&'a Task> {
    dated_in_range(tasks, range, calendar)
        .into_iter()
        .map(|dated| dated.task)
        .collect()
}

fn dated_in_range<'a>(
    tasks: &'a [Task],
    range: DateRange,
    calendar: &CalendarContext,
) -> Vec<DatedTask<'a>> {
    tasks
        .iter()
        .filter_map(|task| {
            let created = task.created_raw().and_then(|raw| calendar.day_of(raw));
            let updated = task.updated_raw().and_then(|raw| calendar.day_of(raw));
            let in_range = created.is_some_and(|day| range.contains(day))
                || updated.is_some_and(|day| range.contains(day));
            in_range.then_some(DatedTask {
                task,
                created,
                updated,
            })
        })
        .collect()
}

pub fn compute_analytics(
    tasks: &[Task],
    window: DateWindow,
    calendar: &CalendarContext,
) -> AnalyticsReport {
    let today = calendar.today;
    let range = window.resolve(today);
    let filtered = dated_in_range(tasks, range, calendar);

    let count_status =
        |status: TaskStatus| filtered.iter().filter(|dated| dated.task.status == status).count();
    let total = filtered.len();
    let completed = count_status(TaskStatus::Done);
    let in_progress = count_status(TaskStatus::InProgress);
    let todo = count_status(TaskStatus::Todo);

    let completed_this_month = filtered
        .iter()
        .filter(|dated| dated.task.is_done())
        .filter_map(|dated| dated.updated)
        .filter(|day| day.year() == today.year() && day.month() == today.month())
        .count();

    let (efficiency, overall_progress) = if total > 0 {
        (
            round_one_decimal(completed as f64 / total as f64 * 100.0),
            round_one_decimal((completed as f64 + in_progress as f64 * 0.5) / total as f64 * 100.0),
        )
    } else {
        (0.0, 0.0)
    };

    let daily_completions = (0..DAILY_TREND_DAYS)
        .rev()
        .map(|days_ago| {
            let date = today - Duration::days(days_ago);
            let completed = filtered
                .iter()
                .filter(|dated| dated.task.is_done() && dated.updated == Some(date))
                .count();
            DailyCompletion {
                date,
                label: short_label(date),
                completed,
            }
        })
        .collect();

    let weekly_trends = (0..WEEKLY_TREND_WEEKS)
        .rev()
        .map(|weeks_ago| weekly_trend(&filtered, today, weeks_ago))
        .collect();

    let status_breakdown = [
        (TaskStatus::Done, completed),
        (TaskStatus::InProgress, in_progress),
        (TaskStatus::Todo, todo),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(status, count)| StatusSlice { status, count })
    .collect();

    AnalyticsReport {
        range,
        total,
        completed,
        in_progress,
        todo,
        remaining: todo + in_progress,
        completed_this_month,
        efficiency,
        overall_progress,
        daily_completions,
        weekly_trends,
        status_breakdown,
    }
}

fn weekly_trend(filtered: &[DatedTask<'_>], today: NaiveDate, weeks_ago: i64) -> WeeklyTrend {
    let end = today - Duration::days(weeks_ago * 7);
    let range = DateRange {
        start: end - Duration::days(6),
        end,
    };

    let mut trend = WeeklyTrend {
        week: format!("Week {}", weeks_ago + 1),
        range,
        label: format!("{} - {}", short_label(range.start), short_label(range.end)),
        completed: 0,
        in_progress: 0,
        created: 0,
    };

    for dated in filtered {
        let updated_in_week = dated.updated.is_some_and(|day| range.contains(day));
        match dated.task.status {
            TaskStatus::Done if updated_in_week => trend.completed += 1,
            TaskStatus::InProgress if updated_in_week => trend.in_progress += 1,
            _ => {}
        }
        if dated.created.is_some_and(|day| range.contains(day)) {
            trend.created += 1;
        }
    }
    trend
}

fn short_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn calendar() -> CalendarContext {
        CalendarContext::fixed(date(2026, 3, 18), None)
    }

    fn dated_task(id: &str, status: TaskStatus, created: Option<&str>, updated: Option<&str>) -> Task {
        let mut task = Task::new(id, format!("task {id}"), status);
        task.created_at = created.map(ToOwned::to_owned);
        task.updated_at = updated.map(ToOwned::to_owned);
        task
    }

    #[test]
    fn windows_resolve_to_inclusive_ranges() {
        let today = date(2026, 3, 18);
        assert_eq!(
            DateWindow::Today.resolve(today),
            DateRange { start: today, end: today }
        );
        assert_eq!(DateWindow::Last7Days.resolve(today).start, date(2026, 3, 12));
        assert_eq!(DateWindow::ThisMonth.resolve(today).start, date(2026, 3, 1));
        assert_eq!("LAST7DAYS".parse::<DateWindow>(), Ok(DateWindow::Last7Days));
        assert!("fortnight".parse::<DateWindow>().is_err());
    }

    #[test]
    fn custom_range_includes_both_boundaries() {
        let tasks = vec![
            dated_task("start", TaskStatus::Todo, Some("2026-03-01"), None),
            dated_task("end", TaskStatus::Todo, Some("2026-03-05T23:59:59"), None),
            dated_task("before", TaskStatus::Todo, Some("2026-02-28"), None),
            dated_task("after", TaskStatus::Todo, Some("2026-03-06"), None),
        ];
        let range = DateRange {
            start: date(2026, 3, 1),
            end: date(2026, 3, 5),
        };
        let ids = filter_tasks_by_range(&tasks, range, &calendar())
            .into_iter()
            .map(|task| task.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["start", "end"]);
    }

    #[test]
    fn dateless_tasks_are_excluded_from_every_window() {
        let tasks = vec![dated_task("ghost", TaskStatus::Done, None, None)];
        for window in [
            DateWindow::Today,
            DateWindow::Last7Days,
            DateWindow::ThisMonth,
            DateWindow::Custom {
                start: date(1970, 1, 1),
                end: date(2100, 1, 1),
            },
        ] {
            let report = compute_analytics(&tasks, window, &calendar());
            assert_eq!(report.total, 0);
            assert!(report.status_breakdown.is_empty());
        }
    }

    #[test]
    fn updated_date_alone_qualifies_a_task() {
        let tasks = vec![dated_task(
            "old",
            TaskStatus::Done,
            Some("2025-12-01"),
            Some("2026-03-18T08:00:00"),
        )];
        let report = compute_analytics(&tasks, DateWindow::Today, &calendar());
        assert_eq!(report.total, 1);
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn reversed_custom_range_selects_nothing() {
        let tasks = vec![dated_task("a", TaskStatus::Todo, Some("2026-03-03"), None)];
        let report = compute_analytics(
            &tasks,
            DateWindow::Custom {
                start: date(2026, 3, 5),
                end: date(2026, 3, 1),
            },
            &calendar(),
        );
        assert_eq!(report.total, 0);
    }

    #[test]
    fn metrics_and_trends() {
        let tasks = vec![
            dated_task("1", TaskStatus::Done, Some("2026-03-02"), Some("2026-03-18")),
            dated_task("2", TaskStatus::Done, Some("2026-03-10"), Some("2026-03-16")),
            dated_task("3", TaskStatus::InProgress, Some("2026-03-15"), Some("2026-03-17")),
            dated_task("4", TaskStatus::Todo, Some("2026-03-18"), None),
            dated_task("5", TaskStatus::Todo, Some("2026-02-10"), None),
        ];
        let report = compute_analytics(&tasks, DateWindow::ThisMonth, &calendar());

        assert_eq!(report.total, 4);
        assert_eq!(report.completed, 2);
        assert_eq!(report.in_progress, 1);
        assert_eq!(report.todo, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(report.completed_this_month, 2);
        assert_eq!(report.efficiency, 50.0);
        assert_eq!(report.overall_progress, 62.5);

        assert_eq!(report.daily_completions.len(), 7);
        assert_eq!(report.daily_completions[0].date, date(2026, 3, 12));
        assert_eq!(report.daily_completions[6].date, date(2026, 3, 18));
        assert_eq!(report.daily_completions[6].label, "Mar 18");
        assert_eq!(report.daily_completions[6].completed, 1);
        assert_eq!(report.daily_completions[4].completed, 1);

        let weeks = &report.weekly_trends;
        assert_eq!(weeks.len(), 4);
        assert_eq!(weeks[0].week, "Week 4");
        assert_eq!(weeks[3].week, "Week 1");
        assert_eq!(
            weeks[3].range,
            DateRange {
                start: date(2026, 3, 12),
                end: date(2026, 3, 18)
            }
        );
        assert_eq!(weeks[3].completed, 2);
        assert_eq!(weeks[3].in_progress, 1);
        assert_eq!(weeks[3].created, 2);
        assert_eq!(weeks[2].created, 1);
        assert_eq!(weeks[1].created, 1);
        assert_eq!(weeks[0].created, 0);

        assert_eq!(
            report.status_breakdown,
            vec![
                StatusSlice { status: TaskStatus::Done, count: 2 },
                StatusSlice { status: TaskStatus::InProgress, count: 1 },
                StatusSlice { status: TaskStatus::Todo, count: 1 },
            ]
        );
    }

    #[test]
    fn empty_input_has_zero_percentages() {
        let report = compute_analytics(&[], DateWindow::Last7Days, &calendar());
        assert_eq!(report.efficiency, 0.0);
        assert_eq!(report.overall_progress, 0.0);
        assert!(report.daily_completions.iter().all(|day| day.completed == 0));
    }

    fn arb_task() -> impl Strategy<Value = Task> {
        let day = prop::option::of((1u32..=28).prop_map(|day| format!("2026-03-{day:02}")));
        (
            "[a-z]{1,6}",
            prop_oneof![
                Just(TaskStatus::Todo),
                Just(TaskStatus::InProgress),
                Just(TaskStatus::Done)
            ],
            day.clone(),
            day,
        )
            .prop_map(|(id, status, created, updated)| {
                let mut task = Task::new(id, "generated", status);
                task.created_at = created;
                task.updated_at = updated;
                task
            })
    }

    proptest! {
        #[test]
        fn analytics_is_idempotent_and_order_independent(
            tasks in prop::collection::vec(arb_task(), 0..20)
        ) {
            let first = compute_analytics(&tasks, DateWindow::ThisMonth, &calendar());
            let second = compute_analytics(&tasks, DateWindow::ThisMonth, &calendar());
            prop_assert_eq!(&first, &second);

            let mut reversed = tasks.clone();
            reversed.reverse();
            let third = compute_analytics(&reversed, DateWindow::ThisMonth, &calendar());
            prop_assert_eq!(&first, &third);
            prop_assert_eq!(first.total, first.completed + first.in_progress + first.todo);
        }
    }
}
