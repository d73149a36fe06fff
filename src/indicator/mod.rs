//! Indicator driver.
//!
//! Two boolean outputs, "attention" and "clear", show whether a person is in
//! view. Outside the startup self-test and the fault fallback they are never
//! both on: every transition switches the old output off before switching the
//! new one on, so an observer of the pins never sees both lit.

mod pins;

use std::time::Duration;

pub use pins::{DryRunPin, IndicatorEvent, IndicatorLog, MemoryPin, OutputPin, SysfsPin};

use crate::error::Result;

/// Logical indicator state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndicatorState {
    /// Both outputs off.
    #[default]
    Idle,
    /// Something was detected, none of it a person.
    Clear,
    /// At least one person in view.
    Attention,
}

/// Hold times for the fixed indicator sequences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndicatorTiming {
    pub self_test_attention: Duration,
    pub self_test_clear: Duration,
    pub fault_hold: Duration,
}

impl Default for IndicatorTiming {
    fn default() -> Self {
        Self {
            self_test_attention: Duration::from_millis(1000),
            self_test_clear: Duration::from_millis(500),
            fault_hold: Duration::from_secs(5),
        }
    }
}

/// How the driver waits during its timed sequences.
pub trait Pause: Send {
    fn pause(&mut self, duration: Duration);
}

/// Real-time waiting.
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Pause that records into an [`IndicatorLog`] instead of sleeping.
pub struct RecordedPause {
    log: IndicatorLog,
}

impl RecordedPause {
    pub fn new(log: IndicatorLog) -> Self {
        Self { log }
    }
}

impl Pause for RecordedPause {
    fn pause(&mut self, duration: Duration) {
        self.log.push(IndicatorEvent::Pause(duration));
    }
}

/// How indicator outputs are driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndicatorBackend {
    /// Linux sysfs GPIO.
    #[default]
    Sysfs,
    /// Log only.
    DryRun,
}

impl std::str::FromStr for IndicatorBackend {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sysfs" | "gpio" => Ok(Self::Sysfs),
            "dry-run" | "dry_run" | "dryrun" => Ok(Self::DryRun),
            other => Err(crate::error::Error::config(format!(
                "unknown indicator backend {:?} (expected sysfs or dry-run)",
                other
            ))),
        }
    }
}

/// Open both outputs on the chosen backend.
pub fn open_driver(
    backend: IndicatorBackend,
    attention_pin: u32,
    clear_pin: u32,
    gpio_root: &std::path::Path,
) -> Result<IndicatorDriver> {
    let (attention, clear): (Box<dyn OutputPin>, Box<dyn OutputPin>) = match backend {
        IndicatorBackend::Sysfs => {
            let mut attention = SysfsPin::open(gpio_root, attention_pin)?;
            let clear = match SysfsPin::open(gpio_root, clear_pin) {
                Ok(pin) => pin,
                Err(err) => {
                    if let Err(undo) = attention.release() {
                        log::warn!("releasing pin {}: {}", attention_pin, undo);
                    }
                    return Err(err);
                }
            };
            (Box::new(attention), Box::new(clear))
        }
        IndicatorBackend::DryRun => (
            Box::new(DryRunPin::new(attention_pin, "attention")),
            Box::new(DryRunPin::new(clear_pin, "clear")),
        ),
    };
    Ok(IndicatorDriver::new(attention, clear))
}

pub struct IndicatorDriver {
    attention: Box<dyn OutputPin>,
    clear: Box<dyn OutputPin>,
    pause: Box<dyn Pause>,
    timing: IndicatorTiming,
    state: IndicatorState,
    released: bool,
}

impl IndicatorDriver {
    pub fn new(attention: Box<dyn OutputPin>, clear: Box<dyn OutputPin>) -> Self {
        Self {
            attention,
            clear,
            pause: Box::new(ThreadPause),
            timing: IndicatorTiming::default(),
            state: IndicatorState::Idle,
            released: false,
        }
    }

    pub fn with_pause(mut self, pause: Box<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_timing(mut self, timing: IndicatorTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    pub fn set_attention(&mut self) -> Result<()> {
        self.transition(IndicatorState::Attention)
    }

    pub fn set_clear(&mut self) -> Result<()> {
        self.transition(IndicatorState::Clear)
    }

    pub fn set_idle(&mut self) -> Result<()> {
        self.transition(IndicatorState::Idle)
    }

    /// Apply a logical state. Redundant transitions do not touch the pins.
    pub fn apply(&mut self, state: IndicatorState) -> Result<()> {
        self.transition(state)
    }

    /// Wiring check: attention for 1 s, clear for 0.5 s, then both off.
    ///
    /// Runs every step even when a write fails and reports the first failure.
    pub fn self_test(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        log::info!(
            "indicator self-test: attention (pin {}) then clear (pin {})",
            self.attention.number(),
            self.clear.number()
        );
        let mut first_err = None;
        keep_first(&mut first_err, self.drive(true, false));
        self.pause.pause(self.timing.self_test_attention);
        keep_first(&mut first_err, self.drive(false, true));
        self.pause.pause(self.timing.self_test_clear);
        keep_first(&mut first_err, self.drive(false, false));
        self.state = IndicatorState::Idle;
        match first_err {
            Some(err) => {
                log::error!("indicator self-test incomplete: {}", err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Structural-fault signal: both outputs on for the fault hold time, then idle.
    pub fn fault_fallback(&mut self, reason: &str) -> Result<()> {
        log::error!("indicator fault fallback: {}", reason);
        if self.released {
            return Ok(());
        }
        let mut first_err = None;
        keep_first(&mut first_err, self.attention.set(true));
        keep_first(&mut first_err, self.clear.set(true));
        self.pause.pause(self.timing.fault_hold);
        keep_first(&mut first_err, self.drive(false, false));
        self.state = IndicatorState::Idle;
        first_err.map_or(Ok(()), Err)
    }

    /// Force both outputs off and release the pins. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut first_err = None;
        keep_first(&mut first_err, self.drive(false, false));
        keep_first(&mut first_err, self.attention.release());
        keep_first(&mut first_err, self.clear.release());
        self.state = IndicatorState::Idle;
        log::info!("indicators off, pins released");
        first_err.map_or(Ok(()), Err)
    }

    fn transition(&mut self, target: IndicatorState) -> Result<()> {
        if self.released || self.state == target {
            return Ok(());
        }
        let (attention, clear) = match target {
            IndicatorState::Idle => (false, false),
            IndicatorState::Clear => (false, true),
            IndicatorState::Attention => (true, false),
        };
        self.drive(attention, clear)?;
        self.state = target;
        Ok(())
    }

    /// Write both outputs, switching off before switching on.
    ///
    /// Every off-write is attempted. The on-write only happens once the other
    /// output is known to be off, so a stuck pin can never leave both lit.
    fn drive(&mut self, attention: bool, clear: bool) -> Result<()> {
        let mut first_err = None;
        if !attention {
            keep_first(&mut first_err, self.attention.set(false));
        }
        if !clear {
            keep_first(&mut first_err, self.clear.set(false));
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        if attention {
            self.attention.set(true)?;
        }
        if clear {
            self.clear.set(true)?;
        }
        Ok(())
    }
}

impl Drop for IndicatorDriver {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("indicator shutdown failed: {}", err);
        }
    }
}

fn keep_first<E>(slot: &mut Option<E>, result: std::result::Result<(), E>) {
    if let Err(err) = result {
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const ATTENTION: u32 = 8;
    const CLEAR: u32 = 10;

    fn recorded() -> (IndicatorDriver, IndicatorLog) {
        let log = IndicatorLog::new();
        let driver = IndicatorDriver::new(
            Box::new(MemoryPin::new(ATTENTION, log.clone())),
            Box::new(MemoryPin::new(CLEAR, log.clone())),
        )
        .with_pause(Box::new(RecordedPause::new(log.clone())));
        (driver, log)
    }

    fn never_both_on(log: &IndicatorLog) -> bool {
        log.levels(ATTENTION, CLEAR)
            .iter()
            .all(|&(attention, clear)| !(attention && clear))
    }

    #[test]
    fn self_test_sequence_is_exact() -> Result<()> {
        let (mut driver, log) = recorded();
        driver.self_test()?;
        use IndicatorEvent::*;
        assert_eq!(
            log.events(),
            vec![
                Write { pin: CLEAR, on: false },
                Write { pin: ATTENTION, on: true },
                Pause(Duration::from_millis(1000)),
                Write { pin: ATTENTION, on: false },
                Write { pin: CLEAR, on: true },
                Pause(Duration::from_millis(500)),
                Write { pin: ATTENTION, on: false },
                Write { pin: CLEAR, on: false },
            ]
        );
        assert!(never_both_on(&log));
        assert_eq!(driver.state(), IndicatorState::Idle);
        Ok(())
    }

    #[test]
    fn transitions_keep_outputs_exclusive() -> Result<()> {
        let (mut driver, log) = recorded();
        driver.set_attention()?;
        driver.set_clear()?;
        driver.set_attention()?;
        driver.set_idle()?;
        driver.set_clear()?;
        assert!(never_both_on(&log));
        assert_eq!(log.levels(ATTENTION, CLEAR).last(), Some(&(false, true)));
        Ok(())
    }

    #[test]
    fn repeated_state_does_not_rewrite_pins() -> Result<()> {
        let (mut driver, log) = recorded();
        driver.set_attention()?;
        let writes = log.events().len();
        driver.set_attention()?;
        assert_eq!(log.events().len(), writes);
        Ok(())
    }

    #[test]
    fn fault_fallback_lights_both_then_idles() -> Result<()> {
        let (mut driver, log) = recorded();
        driver.set_attention()?;
        log.clear();
        driver.fault_fallback("test")?;
        let levels = log.levels(ATTENTION, CLEAR);
        assert!(levels.contains(&(true, true)));
        assert_eq!(levels.last(), Some(&(false, false)));
        assert!(log
            .events()
            .contains(&IndicatorEvent::Pause(Duration::from_secs(5))));
        assert_eq!(driver.state(), IndicatorState::Idle);
        Ok(())
    }

    #[test]
    fn custom_timing_sets_the_hold_times() -> Result<()> {
        let (driver, log) = recorded();
        let mut driver = driver.with_timing(IndicatorTiming {
            self_test_attention: Duration::from_millis(50),
            self_test_clear: Duration::from_millis(20),
            fault_hold: Duration::from_millis(200),
        });
        driver.self_test()?;
        driver.fault_fallback("test")?;
        let pauses: Vec<_> = log
            .events()
            .into_iter()
            .filter_map(|e| match e {
                IndicatorEvent::Pause(d) => Some(d.as_millis()),
                _ => None,
            })
            .collect();
        assert_eq!(pauses, vec![50, 20, 200]);
        Ok(())
    }

    #[test]
    fn shutdown_is_idempotent_and_releases_once() -> Result<()> {
        let (mut driver, log) = recorded();
        driver.set_clear()?;
        driver.shutdown()?;
        driver.shutdown()?;
        drop(driver);
        let released = log
            .events()
            .iter()
            .filter(|e| matches!(e, IndicatorEvent::Released { .. }))
            .count();
        assert_eq!(released, 2);
        assert_eq!(log.levels(ATTENTION, CLEAR).last(), Some(&(false, false)));
        Ok(())
    }

    #[test]
    fn drop_turns_everything_off() {
        let (mut driver, log) = recorded();
        driver.set_attention().unwrap();
        drop(driver);
        assert_eq!(log.levels(ATTENTION, CLEAR).last(), Some(&(false, false)));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("sysfs".parse::<IndicatorBackend>().ok(), Some(IndicatorBackend::Sysfs));
        assert_eq!("Dry-Run".parse::<IndicatorBackend>().ok(), Some(IndicatorBackend::DryRun));
        assert!(matches!("pwm".parse::<IndicatorBackend>(), Err(Error::Config(_))));
    }

    #[test]
    fn second_pin_failure_releases_the_first() {
        // gpio8 is already exported; gpio10 never shows up after export.
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("gpio8")).expect("gpio8");
        let err = open_driver(IndicatorBackend::Sysfs, ATTENTION, CLEAR, root.path())
            .err()
            .expect("error");
        assert!(matches!(err, Error::Indicator { pin: CLEAR, .. }));
        let value = std::fs::read_to_string(root.path().join("gpio8/value")).expect("value");
        assert_eq!(value, "0");
        let unexported = std::fs::read_to_string(root.path().join("unexport")).expect("unexport");
        assert_eq!(unexported, "10");
    }

    #[test]
    fn dry_run_driver_needs_no_hardware() -> Result<()> {
        let mut driver = open_driver(
            IndicatorBackend::DryRun,
            ATTENTION,
            CLEAR,
            std::path::Path::new("/nonexistent"),
        )?;
        driver.set_attention()?;
        assert_eq!(driver.state(), IndicatorState::Attention);
        driver.shutdown()
    }

    #[test]
    fn stuck_output_blocks_the_other_from_lighting() {
        let log = IndicatorLog::new();
        let mut driver = IndicatorDriver::new(
            Box::new(MemoryPin::stuck_on(ATTENTION, log.clone())),
            Box::new(MemoryPin::new(CLEAR, log.clone())),
        )
        .with_pause(Box::new(RecordedPause::new(log.clone())));

        driver.set_attention().unwrap();
        assert!(matches!(
            driver.set_clear(),
            Err(Error::Indicator { pin: ATTENTION, .. })
        ));
        assert_eq!(driver.state(), IndicatorState::Attention);
        assert!(!log.events().contains(&IndicatorEvent::Write { pin: CLEAR, on: true }));

        // Shutdown still tries every off-write and releases both pins.
        assert!(driver.shutdown().is_err());
        assert!(never_both_on(&log));
        let released = log
            .events()
            .iter()
            .filter(|e| matches!(e, IndicatorEvent::Released { .. }))
            .count();
        assert_eq!(released, 2);
    }

    #[test]
    fn self_test_completes_despite_write_failures() {
        let log = IndicatorLog::new();
        let mut driver = IndicatorDriver::new(
            Box::new(MemoryPin::failing(ATTENTION, log.clone())),
            Box::new(MemoryPin::new(CLEAR, log.clone())),
        )
        .with_pause(Box::new(RecordedPause::new(log.clone())));

        let err = driver.self_test().unwrap_err();
        assert!(matches!(err, Error::Indicator { pin: ATTENTION, .. }));
        let pauses = log
            .events()
            .iter()
            .filter(|e| matches!(e, IndicatorEvent::Pause(_)))
            .count();
        assert_eq!(pauses, 2);
        assert_eq!(log.levels(ATTENTION, CLEAR).last(), Some(&(false, false)));
    }
}
