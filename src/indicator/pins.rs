//! Digital output pins behind the indicator driver.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

/// One boolean output channel.
pub trait OutputPin: Send {
    /// Channel number as configured.
    fn number(&self) -> u32;

    fn set(&mut self, on: bool) -> Result<()>;

    /// Give the channel back to the system. Called once at shutdown.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Linux sysfs GPIO
// ----------------------------------------------------------------------------

/// GPIO line driven through `/sys/class/gpio`.
///
/// The number is the kernel GPIO number. On a Raspberry Pi the reference
/// deployment's board pins 8 and 10 are kernel lines 14 and 15.
pub struct SysfsPin {
    number: u32,
    root: PathBuf,
    value_path: PathBuf,
    exported_here: bool,
}

/// udev may need a moment to fix permissions on a freshly exported line.
const EXPORT_SETTLE_ATTEMPTS: u32 = 20;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(10);

impl SysfsPin {
    /// Export the line (if needed) and configure it as an output, initially off.
    pub fn open<P: AsRef<Path>>(root: P, number: u32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let line_dir = root.join(format!("gpio{}", number));
        let mut exported_here = false;
        if !line_dir.exists() {
            write_sysfs(number, &root.join("export"), &number.to_string())?;
            exported_here = true;
        }

        let direction = line_dir.join("direction");
        let mut attempt = 0;
        loop {
            // "low" sets direction to output with the value already driven low.
            match std::fs::write(&direction, "low") {
                Ok(()) => break,
                Err(err) if attempt + 1 < EXPORT_SETTLE_ATTEMPTS => {
                    log::debug!("gpio{} direction not writable yet: {}", number, err);
                    attempt += 1;
                    std::thread::sleep(EXPORT_SETTLE_DELAY);
                }
                Err(err) => {
                    if exported_here {
                        if let Err(undo) =
                            write_sysfs(number, &root.join("unexport"), &number.to_string())
                        {
                            log::warn!("gpio{} left exported: {}", number, undo);
                        }
                    }
                    return Err(Error::Indicator {
                        pin: number,
                        reason: format!("set direction via {}: {}", direction.display(), err),
                    });
                }
            }
        }

        log::info!("gpio{} configured as output", number);
        Ok(Self {
            number,
            value_path: line_dir.join("value"),
            root,
            exported_here,
        })
    }
}

impl OutputPin for SysfsPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn set(&mut self, on: bool) -> Result<()> {
        write_sysfs(self.number, &self.value_path, if on { "1" } else { "0" })
    }

    fn release(&mut self) -> Result<()> {
        self.set(false)?;
        if self.exported_here {
            write_sysfs(self.number, &self.root.join("unexport"), &self.number.to_string())?;
            self.exported_here = false;
        }
        Ok(())
    }
}

fn write_sysfs(pin: u32, path: &Path, value: &str) -> Result<()> {
    std::fs::write(path, value).map_err(|err| Error::Indicator {
        pin,
        reason: format!("write {:?} to {}: {}", value, path.display(), err),
    })
}

// ----------------------------------------------------------------------------
// Dry run
// ----------------------------------------------------------------------------

/// Pin that only logs, for machines without indicator hardware.
pub struct DryRunPin {
    number: u32,
    label: &'static str,
    on: bool,
}

impl DryRunPin {
    pub fn new(number: u32, label: &'static str) -> Self {
        Self {
            number,
            label,
            on: false,
        }
    }
}

impl OutputPin for DryRunPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn set(&mut self, on: bool) -> Result<()> {
        if self.on != on {
            log::debug!(
                "[dry-run] {} (pin {}) -> {}",
                self.label,
                self.number,
                if on { "on" } else { "off" }
            );
        }
        self.on = on;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-memory recording
// ----------------------------------------------------------------------------

/// Something observable that happened on the indicator outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorEvent {
    Write { pin: u32, on: bool },
    Pause(Duration),
    Released { pin: u32 },
}

/// Shared, ordered record of indicator events.
#[derive(Clone, Debug, Default)]
pub struct IndicatorLog {
    events: Arc<Mutex<Vec<IndicatorEvent>>>,
}

impl IndicatorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: IndicatorEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<IndicatorEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Replay the writes and return the on/off level of both pins after each one.
    pub fn levels(&self, attention_pin: u32, clear_pin: u32) -> Vec<(bool, bool)> {
        let mut attention = false;
        let mut clear = false;
        let mut levels = Vec::new();
        for event in self.events() {
            if let IndicatorEvent::Write { pin, on } = event {
                if pin == attention_pin {
                    attention = on;
                } else if pin == clear_pin {
                    clear = on;
                }
                levels.push((attention, clear));
            }
        }
        levels
    }
}

/// Pin that records every write into an [`IndicatorLog`].
pub struct MemoryPin {
    number: u32,
    log: IndicatorLog,
    fail_writes: bool,
    refuse_off: bool,
}

impl MemoryPin {
    pub fn new(number: u32, log: IndicatorLog) -> Self {
        Self {
            number,
            log,
            fail_writes: false,
            refuse_off: false,
        }
    }

    /// A pin whose writes are recorded but reported as failed.
    pub fn failing(number: u32, log: IndicatorLog) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(number, log)
        }
    }

    /// A pin that can be switched on but not off again. The refused writes
    /// are reported as failed and leave the recorded level unchanged.
    pub fn stuck_on(number: u32, log: IndicatorLog) -> Self {
        Self {
            refuse_off: true,
            ..Self::new(number, log)
        }
    }
}

impl OutputPin for MemoryPin {
    fn number(&self) -> u32 {
        self.number
    }

    fn set(&mut self, on: bool) -> Result<()> {
        if self.refuse_off && !on {
            return Err(Error::Indicator {
                pin: self.number,
                reason: "output stuck on".into(),
            });
        }
        self.log.push(IndicatorEvent::Write {
            pin: self.number,
            on,
        });
        if self.fail_writes {
            return Err(Error::Indicator {
                pin: self.number,
                reason: "simulated write failure".into(),
            });
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.log.push(IndicatorEvent::Released { pin: self.number });
        Ok(())
    }
}
