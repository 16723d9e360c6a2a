pub mod email;
pub mod job;
pub mod missed_activity;
pub mod run_stats;

pub use email::EmailService;
pub use job::{run_job_loop, run_sampling_loop, MissedActivityJob, RenderedReport};
pub use missed_activity::{MissedActivityEngine, RunOptions};
pub use run_stats::{EmailSummary, RunLog, RunStats};
