use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters for one monitoring profile.
///
/// Each profile claims the disjoint subset of catalog instruments quoted
/// in its `quote_currency`; any number of independently-parameterized
/// profiles may run side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    /// Quote currency selecting this profile's instruments (e.g. "usdt").
    pub quote_currency: String,
    /// Maximum quote-currency amount committable to buys per instrument per day.
    pub fee_budget: f64,
    /// Minimum increase over the daily baseline before a buy qualifies.
    pub entry_threshold: f64,
    /// Increase above which a move is considered already run away.
    pub entry_ceiling: f64,
    /// Gain over the average buy price that triggers a profit-take sell.
    pub exit_threshold: f64,
    /// Supervisor cycles to wait on an unfilled order or held position.
    pub wait_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub profiles: Vec<ProfileConfig>,
    /// Hour of day, [0, 24), at which baselines are refreshed.
    #[serde(default)]
    pub baseline_refresh_hour: u32,
    #[serde(default = "default_supervisor_interval")]
    pub supervisor_interval_secs: u64,
    /// Minimum holding time before a profit-take sell is considered.
    #[serde(default = "default_min_dwell")]
    pub min_dwell_secs: u64,
    /// Price-to-cost ratio below which an emergency liquidation fires.
    #[serde(default = "default_stop_loss_ratio")]
    pub stop_loss_ratio: f64,
    /// How long startup waits for every instrument's first baseline.
    #[serde(default = "default_ready_timeout")]
    pub baseline_ready_timeout_secs: u64,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

fn default_supervisor_interval() -> u64 {
    5
}

fn default_min_dwell() -> u64 {
    300
}

fn default_stop_loss_ratio() -> f64 {
    0.9
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

impl StrategyConfig {
    /// Validates the whole configuration.
    ///
    /// # Errors
    /// Returns the first violation found; the caller must treat any error
    /// as fatal at construction time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        for (i, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            for other in &self.profiles[i + 1..] {
                if other.name == profile.name {
                    return Err(ConfigError::DuplicateProfile(profile.name.clone()));
                }
                if other
                    .quote_currency
                    .eq_ignore_ascii_case(&profile.quote_currency)
                {
                    return Err(ConfigError::OverlappingProfiles {
                        first: profile.name.clone(),
                        second: other.name.clone(),
                        quote: profile.quote_currency.clone(),
                    });
                }
            }
        }
        if self.baseline_refresh_hour >= 24 {
            return Err(ConfigError::InvalidRefreshHour(self.baseline_refresh_hour));
        }
        if self.supervisor_interval_secs < 5 {
            return Err(ConfigError::SupervisorIntervalTooShort(
                self.supervisor_interval_secs,
            ));
        }
        if self.stop_loss_ratio <= 0.0 || self.stop_loss_ratio >= 1.0 {
            return Err(ConfigError::InvalidStopLossRatio(self.stop_loss_ratio));
        }
        Ok(())
    }
}

impl ProfileConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.quote_currency.trim().is_empty() {
            return Err(ConfigError::invalid_profile(
                &self.name,
                "quote currency is empty",
            ));
        }
        if !(self.fee_budget.is_finite() && self.fee_budget > 0.0) {
            return Err(ConfigError::invalid_profile(
                &self.name,
                format!("fee budget must be positive, got {}", self.fee_budget),
            ));
        }
        if !(self.entry_threshold.is_finite() && self.entry_threshold > 0.0) {
            return Err(ConfigError::invalid_profile(
                &self.name,
                format!(
                    "entry threshold must be positive, got {}",
                    self.entry_threshold
                ),
            ));
        }
        if !(self.entry_ceiling.is_finite() && self.entry_ceiling > self.entry_threshold) {
            return Err(ConfigError::invalid_profile(
                &self.name,
                format!(
                    "entry ceiling ({}) must exceed entry threshold ({})",
                    self.entry_ceiling, self.entry_threshold
                ),
            ));
        }
        if !(self.exit_threshold.is_finite() && self.exit_threshold > 0.0) {
            return Err(ConfigError::invalid_profile(
                &self.name,
                format!(
                    "exit threshold must be positive, got {}",
                    self.exit_threshold
                ),
            ));
        }
        if self.wait_time_secs == 0 {
            return Err(ConfigError::invalid_profile(
                &self.name,
                "wait time must be positive",
            ));
        }
        Ok(())
    }
}
