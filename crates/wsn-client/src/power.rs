//! Transmit power control
//!
//! Hysteresis on RSSI feedback from the chosen cluster head:
//! - `rssi >= high`: more link than needed, step power down
//! - `rssi < low`: link too weak, step power up
//! - in between: optimal band, hold
//!
//! The controller stays adaptive for the whole session: an increase never
//! blocks later decreases.

use tracing::{debug, info};

use wsn_core::PowerConfig;

/// What one feedback value did to the power level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerAdjustment {
    Decreased { from: u8, to: u8 },
    Increased { from: u8, to: u8 },
    /// Weak link but already at maximum power
    AtMaximum,
    /// Strong link but already at minimum power
    AtMinimum,
    /// Inside the hysteresis band
    Optimal,
}

impl PowerAdjustment {
    /// New level when the adjustment changed it
    pub fn new_level(self) -> Option<u8> {
        match self {
            PowerAdjustment::Decreased { to, .. } | PowerAdjustment::Increased { to, .. } => {
                Some(to)
            }
            _ => None,
        }
    }
}

/// Power state of one client
#[derive(Clone, Debug)]
pub struct PowerController {
    config: PowerConfig,
    level: u8,
}

impl PowerController {
    pub fn new(config: PowerConfig) -> Self {
        let level = config
            .initial_level
            .clamp(config.min_level, config.max_level);
        PowerController { config, level }
    }

    /// Feed one RSSI feedback value
    pub fn on_feedback(&mut self, rssi: i16) -> PowerAdjustment {
        let config = &self.config;
        let from = self.level;
        debug!(rssi, level = from, "RSSI feedback from cluster head");

        let adjustment = if rssi >= config.high_threshold && from > config.min_level {
            let to = from
                .saturating_sub(config.decrease_step)
                .max(config.min_level);
            PowerAdjustment::Decreased { from, to }
        } else if rssi < config.low_threshold {
            if from < config.max_level {
                let to = from
                    .saturating_add(config.increase_step)
                    .min(config.max_level);
                PowerAdjustment::Increased { from, to }
            } else {
                PowerAdjustment::AtMaximum
            }
        } else if rssi >= config.high_threshold {
            PowerAdjustment::AtMinimum
        } else {
            PowerAdjustment::Optimal
        };

        match adjustment {
            PowerAdjustment::Decreased { to, .. } => info!(level = to, "lowering tx power"),
            PowerAdjustment::Increased { to, .. } => info!(level = to, "increasing tx power"),
            PowerAdjustment::AtMaximum => debug!("tx power already at max"),
            PowerAdjustment::AtMinimum => debug!("tx power already at min"),
            PowerAdjustment::Optimal => debug!("optimal tx power reached"),
        }

        if let Some(to) = adjustment.new_level() {
            self.level = to;
        }
        adjustment
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }
}
