//! Settings
//!
//! Business rules and search budgets, optionally read from a YAML file. Every field has a default,
//! so an empty file (or no file at all) gives the standard quarterly planning rules.

use std::{fs, path::Path, time::Duration};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error reading the settings file
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("failed to parse settings YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// A setting holds a value outside its domain
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Setting name
        name: &'static str,
        /// Why the value was rejected
        reason: &'static str,
    },
}

/// Planning rules shared by both engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Maximum number of products considered per group; extra products are dropped in input order.
    pub max_products: usize,

    /// Optional cap on the number of planning weeks.
    pub weeks: Option<usize>,

    /// Largest allowed change of the discount between consecutive weeks, in percentage points.
    pub max_weekly_change: u32,

    /// Spacing between consecutive discount tiers, in percentage points.
    pub tier_step: u32,

    /// Largest share of the initial inventory that may be left at the end of the horizon.
    pub max_ending_inventory_ratio: f64,

    /// Heuristic search settings.
    pub search: SearchSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_products: 100,
            weeks: None,
            max_weekly_change: 20,
            tier_step: 5,
            max_ending_inventory_ratio: 0.4,
            search: SearchSettings::default(),
        }
    }
}

/// Budgets and parameters of the heuristic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// Seed of the pseudo-random generator.
    pub seed: u64,

    /// Number of random sequences evaluated in the exploration phase.
    pub exploration_trials: usize,

    /// Number of neighbour sequences evaluated in the local search phase.
    pub local_search_trials: usize,

    /// Probability of moving a week's tier down (and, separately, up) when building a neighbour.
    pub move_probability: f64,

    /// Optional wall-clock budget for the whole search, in seconds.
    pub time_limit_secs: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            exploration_trials: 1_000,
            local_search_trials: 10_000,
            move_probability: 0.1,
            time_limit_secs: None,
        }
    }
}

impl SearchSettings {
    /// Wall-clock budget, if any.
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.map(Duration::from_secs)
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the file cannot be read or parsed, or holds invalid values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Parse settings from YAML text.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the text cannot be parsed or holds invalid values.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Settings = if yaml.trim().is_empty() {
            Settings::default()
        } else {
            serde_norway::from_str(yaml)?
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Check that every value is inside its domain.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_products == 0 {
            return Err(invalid("max_products", "must be at least 1"));
        }

        if self.weeks == Some(0) {
            return Err(invalid("weeks", "must be at least 1"));
        }

        if self.tier_step == 0 {
            return Err(invalid("tier_step", "must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.max_ending_inventory_ratio) {
            return Err(invalid(
                "max_ending_inventory_ratio",
                "must be between 0 and 1",
            ));
        }

        if !(0.0..=0.5).contains(&self.search.move_probability) {
            return Err(invalid(
                "search.move_probability",
                "must be between 0 and 0.5",
            ));
        }

        Ok(())
    }

    /// Largest tier-index move between consecutive weeks used by the heuristic search.
    pub fn max_tier_step(&self) -> usize {
        usize::try_from(self.max_weekly_change / self.tier_step.max(1)).unwrap_or(usize::MAX)
    }

    /// Ending inventory ratio as an exact decimal.
    ///
    /// Goes through the shortest decimal text of the float so `0.4` stays exactly `0.4`.
    pub fn ending_inventory_ratio(&self) -> Decimal {
        self.max_ending_inventory_ratio
            .to_string()
            .parse()
            .unwrap_or(Decimal::ZERO)
    }

    /// Largest number of units that may remain unsold at the end of the horizon.
    pub fn ending_inventory_cap(&self, initial_inventory: u64) -> Decimal {
        self.ending_inventory_ratio() * Decimal::from(initial_inventory)
    }
}

fn invalid(name: &'static str, reason: &'static str) -> SettingsError {
    SettingsError::Invalid { name, reason }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() -> TestResult {
        let settings = Settings::from_yaml("")?;

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_tier_step(), 4);

        Ok(())
    }

    #[test]
    fn partial_yaml_overrides_only_given_fields() -> TestResult {
        let settings = Settings::from_yaml(
            "max_weekly_change: 30\nsearch:\n  seed: 7\n  exploration_trials: 10\n",
        )?;

        assert_eq!(settings.max_tier_step(), 6);
        assert_eq!(settings.search.seed, 7);
        assert_eq!(settings.search.exploration_trials, 10);
        assert_eq!(settings.search.local_search_trials, 10_000);

        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Settings::from_yaml("max_discount: 50"),
            Err(SettingsError::Yaml(_))
        ));
    }

    #[test]
    fn ratio_outside_unit_interval_is_rejected() {
        assert!(matches!(
            Settings::from_yaml("max_ending_inventory_ratio: 1.5"),
            Err(SettingsError::Invalid {
                name: "max_ending_inventory_ratio",
                ..
            })
        ));
    }

    #[test]
    fn ending_inventory_cap_is_exact() {
        let settings = Settings::default();

        assert_eq!(settings.ending_inventory_cap(110), Decimal::from(44));
    }
}
