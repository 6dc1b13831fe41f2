pub mod analytics;
pub mod calendar;
pub mod models;
pub mod task_summary;
