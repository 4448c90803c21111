//! [`FaultMonitor`] – consecutive-fault counter.
//!
//! The controller calls [`FaultMonitor::record_fault`] for every tick whose
//! sensing was rejected and [`FaultMonitor::record_ok`] for every good one.
//! A single bad reading is tolerated; `threshold` bad readings in a row trip
//! the monitor, and the controller forces the robot out of policy control.
//!
//! # Example
//!
//! ```rust
//! use strider_kernel::fault_monitor::{FaultMonitor, FaultStatus};
//!
//! let mut monitor = FaultMonitor::new(3);
//! assert_eq!(monitor.record_fault(), FaultStatus::Degraded(1));
//! assert_eq!(monitor.record_fault(), FaultStatus::Degraded(2));
//! assert_eq!(monitor.record_fault(), FaultStatus::Tripped);
//!
//! // A good reading clears the streak.
//! monitor.record_ok();
//! assert_eq!(monitor.status(), FaultStatus::Nominal);
//! ```

/// Health of the monitored input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    /// The most recent reading was good.
    Nominal,
    /// This many consecutive readings were bad, still below the threshold.
    Degraded(u32),
    /// The consecutive-fault threshold has been reached.
    Tripped,
}

/// Counts consecutive faults against a threshold.
#[derive(Debug, Clone)]
pub struct FaultMonitor {
    threshold: u32,
    consecutive: u32,
}

impl FaultMonitor {
    /// Create a monitor that trips after `threshold` consecutive faults.
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record one bad reading and return the resulting status.
    pub fn record_fault(&mut self) -> FaultStatus {
        self.consecutive = self.consecutive.saturating_add(1);
        self.status()
    }

    /// Record one good reading, clearing the streak.
    pub fn record_ok(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn status(&self) -> FaultStatus {
        match self.consecutive {
            0 => FaultStatus::Nominal,
            n if n >= self.threshold => FaultStatus::Tripped,
            n => FaultStatus::Degraded(n),
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
