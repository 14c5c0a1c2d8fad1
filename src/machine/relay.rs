use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

/// Digital output driving the power relay
///
/// Writes are fire-and-forget: a GPIO write has no failure path the
/// controller can act on.
pub trait OutputPin {
    fn set_level(&mut self, high: bool);
}

/// GPIO line exported through the Linux sysfs interface
pub struct SysfsPin {
    pin: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    pub fn new(pin: u32) -> Self {
        Self {
            pin,
            value_path: PathBuf::from(format!("/sys/class/gpio/gpio{}/value", pin)),
        }
    }
}

impl OutputPin for SysfsPin {
    fn set_level(&mut self, high: bool) {
        let value = if high { "1" } else { "0" };
        if let Err(e) = fs::write(&self.value_path, value) {
            tracing::warn!(pin = self.pin, error = %e, "GPIO write failed");
        }
    }
}

/// Output that only logs, for hosts without GPIO
#[derive(Debug, Default)]
pub struct LoggingPin {
    pub pin: u32,
}

impl OutputPin for LoggingPin {
    fn set_level(&mut self, high: bool) {
        tracing::info!(pin = self.pin, high = high, "Relay output set");
    }
}

/// Output that keeps every written level, shared with the test body
#[derive(Clone, Debug, Default)]
pub struct RecordingPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.levels.borrow().last().copied()
    }
}

impl OutputPin for RecordingPin {
    fn set_level(&mut self, high: bool) {
        self.levels.borrow_mut().push(high);
    }
}
