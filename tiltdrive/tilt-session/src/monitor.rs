use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use spin_sleep::SpinSleeper;
use tracing::{debug, error};

use crate::{link::Dialer, session::SessionManager};

pub const DEFAULT_HEALTH_CHECK_PERIOD: Duration = Duration::from_millis(200);

/// Periodically repairs a [`SessionManager`] from a dedicated thread.
///
/// The first check runs immediately. Dropping the monitor stops the thread
/// and waits for it, which can take up to one period plus a connect timeout.
pub struct HealthMonitor {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn<D: Dialer + 'static>(
        session: SessionManager<D>,
        period: Duration,
    ) -> std::io::Result<Self> {
        if period.is_zero() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "health check period must be greater than zero",
            ));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();

        let thread = std::thread::Builder::new()
            .name("health-check".into())
            .spawn(move || {
                let sleeper = SpinSleeper::default();
                let mut next = Instant::now();
                while !stop2.load(Ordering::Acquire) {
                    match session.health_check() {
                        None | Some(Ok(())) => {}
                        // Already logged and recorded in the status by the session
                        Some(Err(e)) => debug!("Health check failed: {e}"),
                    }

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        sleeper.sleep(next - now);
                    } else {
                        // Fell behind (slow connect), don't try to catch up
                        next = now;
                    }
                }
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Health check thread panicked");
            }
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::HealthMonitor;
    use crate::{mock::MockDialer, RemoteConfig, SessionManager};

    fn wait_until(mut f: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !f() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn connects_then_idles() {
        let dialer = MockDialer::default();
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::new("10.0.0.2", 1025));
        let monitor = HealthMonitor::spawn(session.clone(), Duration::from_millis(10)).unwrap();

        wait_until(|| session.is_healthy());
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(dialer.attempts(), 1);
        monitor.stop();
    }

    #[test]
    fn repairs_after_send_failure() {
        let dialer = MockDialer::default();
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::new("10.0.0.2", 1025));
        let _monitor = HealthMonitor::spawn(session.clone(), Duration::from_millis(10)).unwrap();
        wait_until(|| session.is_healthy());

        dialer.set_fail_writes(true);
        let packet = tilt_packet::encode(true, 0, 0.0, 0.0, 0.0);
        assert!(session.send(&packet).is_err());
        dialer.set_fail_writes(false);

        wait_until(|| session.is_healthy());
        assert_eq!(dialer.attempts(), 2);
        session.send(&packet).unwrap();
    }

    #[test]
    fn zero_period_is_rejected() {
        let dialer = MockDialer::default();
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::new("10.0.0.2", 1025));
        let Err(err) = HealthMonitor::spawn(session, Duration::ZERO) else {
            panic!("zero period accepted");
        };
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(dialer.attempts(), 0);
    }

    #[test]
    fn keeps_retrying_while_refused() {
        let dialer = MockDialer::default();
        dialer.set_refuse(true);
        let session = SessionManager::with_dialer(dialer.clone(), RemoteConfig::new("10.0.0.2", 1025));
        let monitor = HealthMonitor::spawn(session.clone(), Duration::from_millis(5)).unwrap();

        wait_until(|| dialer.attempts() >= 3);
        assert!(!session.is_healthy());
        drop(monitor);

        let attempts = dialer.attempts();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(dialer.attempts(), attempts);
    }
}
