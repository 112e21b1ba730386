//! Client for the rtrain remote-training service.
//!
//! [`RTrainSession`] submits a job, polls its status with bounded retries
//! while feeding a [`ProgressDisplay`], and fetches the result once the job
//! has finished.

pub mod error;
pub mod poller;
pub mod progress;
pub mod retry;
pub mod session;

pub use error::ClientError;
pub use progress::{LogProgress, NoProgress, ProgressDisplay};
pub use retry::RetryPolicy;
pub use session::{JobOutcome, PollOptions, RTrainSession};
