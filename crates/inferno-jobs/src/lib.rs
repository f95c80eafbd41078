//! Async job manager and streaming substrate (spec §4.7, §4.8).

pub mod job;
pub mod stream;

pub use job::{AsyncJob, AsyncJobStatus, InMemoryJobStateStore, JobExecutor, JobManager, JobStateStore};
pub use stream::{collect_content, ResponseStream};
