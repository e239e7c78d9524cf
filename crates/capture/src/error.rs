use vessel_affinity::ScheduleError;
use vessel_kernel::HostError;
use vessel_persist::EncodeError;

/// Internal failures on a committed path. Turned into
/// [`Outcome::Failed`](crate::Outcome::Failed) before reaching the actor.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("host rejected the operation: {0}")]
    Host(#[from] HostError),
    #[error("scheduling failed: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("snapshot could not be encoded: {0}")]
    Encode(#[from] EncodeError),
}
