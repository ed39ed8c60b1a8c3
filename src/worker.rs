//! Background ESD checking (requires the `std` feature)
//!
//! [`EsdWorker`] runs [`PanelController::check_esd`] on its own thread. The
//! controller is shared through `Arc<Mutex<_>>`; each check holds the lock
//! for its whole duration, so it never interleaves with a power transition
//! or backlight change made through the same mutex. [`EsdWorker::shutdown`]
//! waits for an in-flight check to finish before returning.
//!
//! All times are milliseconds since a shared `epoch`; pass
//! [`millis_since`]`(epoch)` to [`PanelOps::power_on`](crate::PanelOps::power_on)
//! so the worker and the controller agree on when checks are due.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::backlight::{LedTrigger, PwmOutput};
use crate::esd::{EsdFailure, EsdOutcome};
use crate::interface::{DsiLink, TearSignal};
use crate::panel::PanelController;

/// Default time between schedule polls
pub const DEFAULT_POLL: Duration = Duration::from_millis(50);

/// Milliseconds elapsed since `epoch`
pub fn millis_since(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

/// Handle to the ESD thread
///
/// Dropping the handle shuts the thread down.
pub struct EsdWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EsdWorker {
    /// Start checking `panel`
    ///
    /// The schedule is polled every `poll`; `on_failure` runs outside the
    /// panel lock for each failed check.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the thread cannot be created.
    pub fn spawn<L, T, P, S, F>(
        panel: Arc<Mutex<PanelController<L, T, P>>>,
        epoch: Instant,
        poll: Duration,
        mut tear: S,
        mut on_failure: F,
    ) -> std::io::Result<Self>
    where
        L: DsiLink + Send + 'static,
        T: LedTrigger + Send + 'static,
        P: PwmOutput + Send + 'static,
        S: TearSignal + Send + 'static,
        F: FnMut(EsdFailure) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("esd-check".into())
            .spawn(move || {
                log::debug!("esd worker: started");
                while !thread_stop.load(Ordering::Acquire) {
                    let outcome = {
                        let mut panel = panel.lock().unwrap_or_else(PoisonError::into_inner);
                        panel.check_esd(millis_since(epoch), &mut tear)
                    };
                    if let EsdOutcome::Failed(failure) = outcome {
                        on_failure(failure);
                    }
                    std::thread::park_timeout(poll);
                }
                log::debug!("esd worker: stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("esd worker: thread panicked");
            }
        }
    }
}

impl Drop for EsdWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlight::{NoLed, NoPwm};
    use crate::boot_mode::BootParams;
    use crate::command::Command;
    use crate::dispatcher::Links;
    use crate::interface::{NoTearSignal, TxRequest};
    use crate::panel::PanelOps;
    use crate::property::{PropertyMap, keys};
    use crate::resolver::{VariantId, resolve};
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;

    /// Thread-safe link counting bus turnarounds
    struct CountingLink {
        turnarounds: Arc<AtomicU32>,
        healthy: bool,
    }

    impl DsiLink for CountingLink {
        type Error = ();

        fn transmit(&mut self, _commands: &[Command], _request: TxRequest) -> Result<(), ()> {
            Ok(())
        }

        fn read(&mut self, _: &Command, _: TxRequest, _buf: &mut [u8]) -> Result<usize, ()> {
            Ok(0)
        }

        fn bus_turnaround(&mut self) -> Result<(), ()> {
            self.turnarounds.fetch_add(1, Ordering::SeqCst);
            if self.healthy { Ok(()) } else { Err(()) }
        }
    }

    fn shared_panel(
        healthy: bool,
    ) -> (Arc<Mutex<PanelController<CountingLink, NoLed, NoPwm>>>, Arc<AtomicU32>) {
        let props = PropertyMap::new()
            .with_u32(keys::WIDTH, 720)
            .with_u32(keys::HEIGHT, 1280)
            .with_u32(keys::BPP, 24)
            .with_bytes(keys::PHY_TIMINGS, &[0; 12])
            .with_flag(keys::ESD_CHECK)
            .with_str(keys::STATUS_CHECK_MODE, "bta_check");
        let mut resolved =
            resolve(&VariantId::new("panel", 0), &props, &BootParams::default()).unwrap();
        resolved.config.esd.start_delay_ms = 0;
        resolved.config.esd.interval_ms = 5;

        let turnarounds = Arc::new(AtomicU32::new(0));
        let link = CountingLink {
            turnarounds: Arc::clone(&turnarounds),
            healthy,
        };
        let panel = PanelController::new(Links::Single(link), resolved, NoLed, NoPwm);
        (Arc::new(Mutex::new(panel)), turnarounds)
    }

    #[test]
    fn test_worker_reports_failures() {
        let (panel, _) = shared_panel(false);
        let epoch = Instant::now();
        panel.lock().unwrap().power_on(millis_since(epoch));

        let (tx, rx) = mpsc::channel();
        let worker = EsdWorker::spawn(
            Arc::clone(&panel),
            epoch,
            Duration::from_millis(1),
            NoTearSignal,
            move |failure| {
                let _ = tx.send(failure);
            },
        )
        .unwrap();

        let failure = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(failure, EsdFailure::NoResponse);
        worker.shutdown();
    }

    #[test]
    fn test_no_checks_after_power_off() {
        let (panel, turnarounds) = shared_panel(true);
        let epoch = Instant::now();
        panel.lock().unwrap().power_on(millis_since(epoch));

        let worker = EsdWorker::spawn(
            Arc::clone(&panel),
            epoch,
            Duration::from_millis(1),
            NoTearSignal,
            |_| {},
        )
        .unwrap();
        assert!(worker.is_running());

        while turnarounds.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        // Holding the lock across power-off guarantees no check is in flight
        panel.lock().unwrap().power_off();
        let seen = turnarounds.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(turnarounds.load(Ordering::SeqCst), seen);

        worker.shutdown();
        assert_eq!(Arc::strong_count(&panel), 1);
    }
}
