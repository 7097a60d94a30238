//! Decides which day-long windows need a summary and feeds them to the pipeline.

pub mod jobs;
pub mod trigger;

pub use jobs::{generate_jobs, start_of_day, AggregationJob, UserJobs};
pub use trigger::{PassReport, Trigger};
