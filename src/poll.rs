use crate::config;
use crate::service::{JobStatus, ReportJob, ReportService};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const WAIT_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("job {job_id} still running after {waited:?} and {polls} polls")]
    Timeout {
        job_id: i64,
        waited: Duration,
        polls: u32,
    },

    #[error("job {job_id} ended with status {status}: {message}")]
    Failed {
        job_id: i64,
        status: String,
        message: String,
    },

    #[error("interrupted while waiting for job {job_id}")]
    Cancelled { job_id: i64 },
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub max_polls: Option<u32>,
    pub done_status: String,
    pub failure_statuses: Vec<String>,
}

impl PollPolicy {
    pub fn from_config(cfg: &config::Poll) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_seconds),
            timeout: (cfg.timeout_seconds > 0).then(|| Duration::from_secs(cfg.timeout_seconds)),
            max_polls: (cfg.max_polls > 0).then_some(cfg.max_polls),
            done_status: cfg.done_status.clone(),
            failure_statuses: cfg.failure_statuses.clone(),
        }
    }
}

pub trait Waiter {
    fn start(&mut self);
    fn wait(&mut self, d: Duration) -> bool;
    fn elapsed(&self) -> Duration;
}

pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Default)]
pub struct Interrupt {
    waiting: AtomicBool,
    cancelled: AtomicBool,
}

impl Interrupt {
    // false means nothing will observe the cancel; the handler exits instead.
    pub fn signal(&self) -> bool {
        self.waiting.load(Ordering::SeqCst) && !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }
}

pub struct ThreadWaiter {
    started: Instant,
    interrupt: Arc<Interrupt>,
}

impl ThreadWaiter {
    pub fn new(interrupt: Arc<Interrupt>) -> Self {
        Self {
            started: Instant::now(),
            interrupt,
        }
    }

    fn sleep_until(&self, until: Instant) -> bool {
        loop {
            if self.interrupt.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= until {
                return true;
            }
            std::thread::sleep(WAIT_SLICE.min(until - now));
        }
    }
}

impl Waiter for ThreadWaiter {
    fn start(&mut self) {
        self.started = Instant::now();
    }

    fn wait(&mut self, d: Duration) -> bool {
        self.interrupt.set_waiting(true);
        let completed = self.sleep_until(Instant::now() + d);
        self.interrupt.set_waiting(false);
        completed
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub fn install_interrupt_handler() -> Result<Arc<Interrupt>> {
    let interrupt = Arc::new(Interrupt::default());
    let handler = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        if !handler.signal() {
            eprintln!("interrupted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    })
    .with_context(|| "installing Ctrl-C handler")?;
    Ok(interrupt)
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub job: ReportJob,
    pub polls: u32,
    pub waits: u32,
}

pub fn wait_for_completion<S, W>(
    service: &mut S,
    job_id: i64,
    policy: &PollPolicy,
    waiter: &mut W,
) -> Result<PollOutcome>
where
    S: ReportService + ?Sized,
    W: Waiter,
{
    let mut polls = 0u32;
    let mut waits = 0u32;
    waiter.start();
    loop {
        let job = service
            .report_job(job_id)
            .with_context(|| format!("checking status of job {job_id}"))?;
        polls += 1;

        let raw = job.status.clone().unwrap_or_default();
        match JobStatus::classify(&raw, &policy.done_status, &policy.failure_statuses) {
            JobStatus::Done => {
                info!("job {job_id} done after {polls} polls");
                return Ok(PollOutcome { job, polls, waits });
            }
            JobStatus::Failed(status) => {
                return Err(PollError::Failed {
                    job_id,
                    status,
                    message: job.status_message.unwrap_or_default(),
                }
                .into());
            }
            JobStatus::InProgress(status) => {
                let out_of_polls = policy.max_polls.is_some_and(|max| polls >= max);
                let out_of_time = policy
                    .timeout
                    .is_some_and(|t| waiter.elapsed() + policy.interval > t);
                if out_of_polls || out_of_time {
                    return Err(PollError::Timeout {
                        job_id,
                        waited: waiter.elapsed(),
                        polls,
                    }
                    .into());
                }

                info!(
                    "job {job_id} status: {status}, sleeping {} seconds",
                    policy.interval.as_secs()
                );
                if !waiter.wait(policy.interval) {
                    warn!("job {job_id} left running on the server; it was not cancelled");
                    return Err(PollError::Cancelled { job_id }.into());
                }
                waits += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_outside_a_wait_asks_to_exit() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.signal());
        assert!(!interrupt.is_cancelled());
    }

    #[test]
    fn second_interrupt_during_a_wait_asks_to_exit() {
        let interrupt = Interrupt::default();
        interrupt.set_waiting(true);
        assert!(interrupt.signal());
        assert!(interrupt.is_cancelled());
        assert!(!interrupt.signal());
    }

    #[test]
    fn cancelled_wait_returns_early() {
        let interrupt = Arc::new(Interrupt::default());
        let mut waiter = ThreadWaiter::new(Arc::clone(&interrupt));

        let signaller = {
            let interrupt = Arc::clone(&interrupt);
            std::thread::spawn(move || {
                while !interrupt.signal() {
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
        };
        let begun = Instant::now();
        assert!(!waiter.wait(Duration::from_secs(30)));
        signaller.join().unwrap();

        assert!(begun.elapsed() < Duration::from_secs(5));
        assert!(!interrupt.waiting.load(Ordering::SeqCst));
    }

    #[test]
    fn start_resets_the_clock() {
        let mut waiter = ThreadWaiter::new(Arc::new(Interrupt::default()));
        std::thread::sleep(Duration::from_millis(300));
        waiter.start();
        assert!(waiter.elapsed() < Duration::from_millis(300));
        assert!(waiter.wait(Duration::from_millis(20)));
    }
}
