//! In-memory dialer for exercising the session state machine.

use std::{
    io::Write,
    net::SocketAddrV4,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{Dialer, Link};

#[derive(Default)]
pub(crate) struct MockShared {
    pub attempts: AtomicUsize,
    pub closes: AtomicUsize,
    pub refuse: AtomicBool,
    pub fail_writes: AtomicBool,
    pub dial_delay: Mutex<Duration>,
    pub last_addr: Mutex<Option<SocketAddrV4>>,
    pub written: Mutex<Vec<u8>>,
}

#[derive(Default, Clone)]
pub(crate) struct MockDialer(pub Arc<MockShared>);

impl MockDialer {
    pub fn attempts(&self) -> usize {
        self.0.attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.0.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.0.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_dial_delay(&self, delay: Duration) {
        *self.0.dial_delay.lock() = delay;
    }

    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.written.lock())
    }
}

pub(crate) struct MockLink(Arc<MockShared>);

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            ));
        }
        self.0.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Link for MockLink {
    fn close(self) -> std::io::Result<()> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        // Close errors must be swallowed by the session
        Err(std::io::Error::other("close failed"))
    }
}

impl Dialer for MockDialer {
    type Link = MockLink;

    fn dial(&self, addr: SocketAddrV4) -> std::io::Result<MockLink> {
        self.0.attempts.fetch_add(1, Ordering::SeqCst);
        *self.0.last_addr.lock() = Some(addr);
        let delay = *self.0.dial_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.0.refuse.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        Ok(MockLink(self.0.clone()))
    }
}
