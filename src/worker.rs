//! One OS thread per rig worker.
//!
//! A [`Worker`] owns a thread that first initializes its device (opening the
//! camera, bringing up the stage controller) and then runs a loop body until
//! asked to stop. Startup is a handshake: [`Worker::spawn()`] does not return
//! until the worker reports it is ready, so the orchestrator brings the rig up
//! in a fixed order.

use crate::cell::ReadySignal;
use crate::error::RigError;

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), RigError>>>,
}

// Makes sure the orchestrator wakes up even if `init` panics.
struct ReadyGuard(ReadySignal);

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        if self.0.peek().is_none() {
            self.0.set(false);
        }
    }
}

impl Worker {
    /// Starts a worker thread named `name`.
    ///
    /// `init` runs on the new thread and builds the loop state; `body` is then
    /// called with that state once per iteration until [`Worker::stop()`] is
    /// called or it returns an error. The stop flag is checked once at the top
    /// of each iteration, so `body` is responsible for its own pacing.
    ///
    /// Blocks until `init` finishes. If it fails, the thread is joined and
    /// the error returned here.
    pub fn spawn<S, I, B>(name: &str, init: I, mut body: B) -> Result<Self, RigError>
    where
        I: FnOnce() -> Result<S, RigError> + Send + 'static,
        B: FnMut(&mut S) -> Result<(), RigError> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let ready = ReadySignal::new();

        let th_stop = Arc::clone(&stop);
        let th_ready = ReadyGuard(ready.clone());
        let th_name = name.to_owned();

        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut state = match init() {
                    Ok(state) => state,
                    Err(e) => {
                        error!("{} : failed to start : {}.", th_name, e);
                        th_ready.0.set(false);
                        return Err(e);
                    }
                };
                th_ready.0.set(true);
                info!("{} : running.", th_name);

                while !th_stop.load(Ordering::Acquire) {
                    if let Err(e) = body(&mut state) {
                        error!("{} : stopped on error : {}.", th_name, e);
                        return Err(e);
                    }
                }

                info!("{} : terminated.", th_name);
                Ok(())
            })?;

        if ready.wait() {
            return Ok(Worker {
                name: name.to_owned(),
                stop,
                handle: Some(handle),
            });
        }

        match handle.join() {
            Ok(Err(e)) => Err(e),
            _ => Err(RigError::WorkerPanicked(name.to_owned())),
        }
    }

    /// The worker's thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker loop is still going.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raises the stop flag and joins the thread. Any blocking read the loop
    /// is in the middle of runs to completion first. Returns the error the
    /// loop died with, if it died.
    pub fn stop(&mut self) -> Result<(), RigError> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(res) => res,
                Err(_) => Err(RigError::WorkerPanicked(self.name.clone())),
            },
            None => Ok(()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                warn!("{} : error during shutdown : {}.", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::LatestCell;
    use crate::config::ConfigError;
    use std::time::Duration;

    #[test]
    fn runs_body_until_stopped() {
        let count = LatestCell::new(0u64);
        let th_count = count.clone();

        let mut worker = Worker::spawn(
            "counter",
            || Ok(0u64),
            move |n: &mut u64| {
                *n += 1;
                th_count.publish(*n);
                thread::sleep(Duration::from_millis(1));
                Ok(())
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert!(worker.is_running());
        assert!(worker.stop().is_ok());
        assert!(!worker.is_running());

        let after_stop = count.read();
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(count.read(), after_stop);
    }

    #[test]
    fn init_failure_is_returned_from_spawn() {
        let res = Worker::spawn(
            "broken",
            || -> Result<(), RigError> {
                Err(ConfigError::Invalid("no camera".to_owned()).into())
            },
            |_| Ok(()),
        );
        assert!(matches!(res, Err(RigError::Config(_))));
    }

    #[test]
    fn init_panic_does_not_hang() {
        let res = Worker::spawn(
            "panicky",
            || -> Result<(), RigError> { panic!("boom") },
            |_| Ok(()),
        );
        assert!(matches!(res, Err(RigError::WorkerPanicked(_))));
    }

    #[test]
    fn body_error_ends_the_loop() {
        let mut worker = Worker::spawn(
            "fails",
            || Ok(()),
            |_| Err(ConfigError::Invalid("bad state".to_owned()).into()),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!worker.is_running());
        assert!(matches!(worker.stop(), Err(RigError::Config(_))));
    }
}
