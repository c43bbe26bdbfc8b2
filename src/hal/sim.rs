//! In-memory lines. Each line hands out a cloneable handle so that another task (the stdin
//! driver in the binary, or a test) can press buttons and watch the LED.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{HalError, InputLine, OutputLine};

#[derive(Clone, Debug, Default)]
pub struct LineHandle {
    level: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl LineHandle {
    pub fn set(&self, active: bool) {
        self.level.store(active, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Number of times the owning output line was driven.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SimInput {
    name: String,
    handle: LineHandle,
}

impl SimInput {
    pub fn new(name: impl Into<String>) -> (Self, LineHandle) {
        let handle = LineHandle::default();
        (
            Self {
                name: name.into(),
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl InputLine for SimInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_active(&mut self) -> Result<bool, HalError> {
        Ok(self.handle.get())
    }
}

#[derive(Debug)]
pub struct SimOutput {
    name: String,
    handle: LineHandle,
}

impl SimOutput {
    pub fn new(name: impl Into<String>) -> (Self, LineHandle) {
        let handle = LineHandle::default();
        (
            Self {
                name: name.into(),
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl OutputLine for SimOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&mut self, on: bool) -> Result<(), HalError> {
        self.handle.set(on);
        self.handle.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.handle.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_state_with_lines() {
        let (mut input, button) = SimInput::new("on");
        assert!(!input.is_active().unwrap());
        button.set(true);
        assert!(input.is_active().unwrap());

        let (mut led, watch) = SimOutput::new("led");
        led.set(true).unwrap();
        assert!(watch.get());
        assert!(led.is_on());
        led.set(false).unwrap();
        assert_eq!(watch.writes(), 2);
        assert_eq!(led.name(), "led");
    }
}
