#![allow(dead_code)]

use medgate::{ManualClock, RateGate};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Error type for scripted attempts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl TestError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TestError::Transient(_))
    }
}

/// Rate gate on a manual clock starting at zero.
pub fn manual_gate(capacity: usize, window: Duration) -> (Arc<RateGate>, ManualClock) {
    let clock = ManualClock::new();
    let gate = RateGate::with_clock(capacity, window, Arc::new(clock.clone())).expect("valid gate");
    (Arc::new(gate), clock)
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
