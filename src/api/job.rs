//! Waiting on array-side jobs
//!
//! ZAPI `-async` calls and REST `202 Accepted` responses hand back a job.
//! The call stays synchronous for the caller: we poll with exponential
//! backoff until the job finishes or the job timeout elapses.

use crate::api::classifier::CallSite;
use crate::api::BackendOptions;
use crate::error::{Error, Result};
use backoff::ExponentialBackoff;
use std::future::Future;
use tracing::debug;

/// Result of one job poll
#[derive(Debug)]
pub enum JobPoll {
    Pending,
    Succeeded,
    /// Terminal failure, already classified
    Failed(Error),
}

fn policy(options: &BackendOptions) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: options.job_poll_interval,
        max_interval: options.job_poll_interval * 8,
        max_elapsed_time: Some(options.job_timeout),
        ..Default::default()
    }
}

/// Poll until the job leaves the pending state
///
/// Transient poll failures are retried; running past the job timeout
/// yields a transient [`Error::Timeout`].
pub async fn wait_for_job<F, Fut>(options: &BackendOptions, site: &CallSite<'_>, job_id: &str, mut poll: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobPoll>>,
{
    let operation = site.operation.to_string();
    let target = site.target.to_string();
    let mut attempts = 0u32;

    let outcome = backoff::future::retry(policy(options), || {
        attempts += 1;
        let fut = poll();
        let operation = operation.clone();
        let target = target.clone();
        async move {
            match fut.await {
                Ok(JobPoll::Succeeded) => Ok(()),
                Ok(JobPoll::Failed(e)) => Err(backoff::Error::permanent(e)),
                Ok(JobPoll::Pending) => Err(backoff::Error::transient(Error::Timeout { operation, target })),
                Err(e) if e.is_transient() => Err(backoff::Error::transient(e)),
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await;

    debug!(
        operation = site.operation,
        target = site.target,
        job = job_id,
        attempts,
        ok = outcome.is_ok(),
        "Array job finished waiting"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn options() -> BackendOptions {
        BackendOptions {
            job_poll_interval: Duration::from_millis(1),
            job_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_waits_through_pending() {
        let counter = AtomicU32::new(0);
        let polls = &counter;
        let site = CallSite::new("FlexgroupCreate", "flexgroup", "fg1");
        wait_for_job(&options(), &site, "job-1", move || async move {
            if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(JobPoll::Pending)
            } else {
                Ok(JobPoll::Succeeded)
            }
        })
        .await
        .unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_job_is_terminal() {
        let counter = AtomicU32::new(0);
        let polls = &counter;
        let site = CallSite::new("VolumeCreate", "volume", "vol1");
        let err = wait_for_job(&options(), &site, "job-2", move || async move {
            polls.fetch_add(1, Ordering::SeqCst);
            Ok(JobPoll::Failed(Error::InvalidArgument("aggregate full".into())))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_finishing_job_times_out() {
        let site = CallSite::new("VolumeDestroy", "volume", "vol1");
        let err = wait_for_job(&options(), &site, "job-3", || async { Ok(JobPoll::Pending) })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
