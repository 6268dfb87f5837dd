use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

/// Longest single sleep taken by [`pause`].
pub const PACING_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Polls `condition` every `poll` until it holds, `timeout` elapses or `cancel`
/// fires. Elapsed time is the sum of the durations handed to `sleep`.
pub fn wait_until<C, S, E>(
    mut condition: C,
    poll: Duration,
    timeout: Option<Duration>,
    cancel: &CancelToken,
    sleep: &mut S,
) -> Result<WaitOutcome, E>
where
    C: FnMut() -> Result<bool, E>,
    S: FnMut(Duration),
{
    let poll = poll.max(Duration::from_millis(1));
    let mut waited = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        if condition()? {
            return Ok(WaitOutcome::Ready);
        }

        let step = match timeout {
            Some(limit) if waited >= limit => return Ok(WaitOutcome::TimedOut),
            Some(limit) => poll.min(limit - waited),
            None => poll,
        };
        sleep(step);
        waited += step;
    }
}

/// Sleeps for `duration` in slices of at most [`PACING_SLICE`].
///
/// Returns `false` if `cancel` fired before the full duration passed.
pub fn pause<S>(duration: Duration, cancel: &CancelToken, sleep: &mut S) -> bool
where
    S: FnMut(Duration),
{
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let step = remaining.min(PACING_SLICE);
        sleep(step);
        remaining -= step;
    }
    !cancel.is_cancelled()
}
