//! fleet.toml configuration parser.
//!
//! `FleetConfig` mirrors the file: every field is optional. `validate()`
//! fills in defaults and checks everything that does not depend on the
//! step-rule normalization (that lives with the policy engine).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{CapacityClass, StepRule, default_capacity_classes, default_step_rules};

pub const DEFAULT_FLEET_NAME: &str = "workers";
pub const DEFAULT_SOURCE: &str = "S3NotificationQueue";
pub const DEFAULT_MIN_INSTANCES: u32 = 1;
pub const DEFAULT_MAX_INSTANCES: u32 = 10;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(200);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    pub fleet: Option<FleetSection>,
    pub metric: Option<MetricSection>,
    #[serde(default, rename = "step", skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepRule>,
    #[serde(default, rename = "capacity", skip_serializing_if = "Vec::is_empty")]
    pub capacity: Vec<CapacityClass>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSection {
    pub name: Option<String>,
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
    pub cooldown: Option<String>,
    pub poll_interval: Option<String>,
    pub max_sample_age: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSection {
    pub source: Option<String>,
    pub statistic: Option<String>,
}

/// Validated, defaulted configuration for one fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetSettings {
    pub name: String,
    pub min_instances: u32,
    pub max_instances: u32,
    pub cooldown: Duration,
    pub poll_interval: Duration,
    /// Samples older than this are treated as unavailable.
    pub max_sample_age: Duration,
    pub source_id: String,
    /// Step rules as written; normalized by the policy engine.
    pub steps: Vec<StepRule>,
    /// Capacity classes in priority order.
    pub capacity: Vec<CapacityClass>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_FLEET_NAME.to_string(),
            min_instances: DEFAULT_MIN_INSTANCES,
            max_instances: DEFAULT_MAX_INSTANCES,
            cooldown: DEFAULT_COOLDOWN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_sample_age: DEFAULT_POLL_INTERVAL * 2,
            source_id: DEFAULT_SOURCE.to_string(),
            steps: default_step_rules(),
            capacity: default_capacity_classes(),
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A fully spelled-out config carrying every default.
    pub fn scaffold(name: &str) -> Self {
        FleetConfig {
            fleet: Some(FleetSection {
                name: Some(name.to_string()),
                min_instances: Some(DEFAULT_MIN_INSTANCES),
                max_instances: Some(DEFAULT_MAX_INSTANCES),
                cooldown: Some("200s".to_string()),
                poll_interval: Some("60s".to_string()),
                max_sample_age: Some("120s".to_string()),
            }),
            metric: Some(MetricSection {
                source: Some(DEFAULT_SOURCE.to_string()),
                statistic: Some("max".to_string()),
            }),
            steps: default_step_rules(),
            capacity: default_capacity_classes(),
        }
    }

    /// Apply defaults and validate.
    pub fn validate(&self) -> ConfigResult<FleetSettings> {
        let fleet = self.fleet.clone().unwrap_or_default();
        let metric = self.metric.clone().unwrap_or_default();

        let min_instances = fleet.min_instances.unwrap_or(DEFAULT_MIN_INSTANCES);
        let max_instances = fleet.max_instances.unwrap_or(DEFAULT_MAX_INSTANCES);
        if min_instances == 0 {
            return Err(ConfigError::ZeroMinInstances);
        }
        if min_instances > max_instances {
            return Err(ConfigError::InstanceRange {
                min: min_instances,
                max: max_instances,
            });
        }

        let cooldown = optional_duration("cooldown", fleet.cooldown.as_deref())?
            .unwrap_or(DEFAULT_COOLDOWN);
        let poll_interval = optional_duration("poll_interval", fleet.poll_interval.as_deref())?
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "poll_interval",
            });
        }
        let max_sample_age = optional_duration("max_sample_age", fleet.max_sample_age.as_deref())?
            .unwrap_or(poll_interval * 2);
        if max_sample_age.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "max_sample_age",
            });
        }

        if let Some(statistic) = metric.statistic.as_deref()
            && !statistic.eq_ignore_ascii_case("max")
        {
            return Err(ConfigError::UnsupportedStatistic(statistic.to_string()));
        }

        let steps = if self.steps.is_empty() {
            default_step_rules()
        } else {
            self.steps.clone()
        };

        let capacity = if self.capacity.is_empty() {
            default_capacity_classes()
        } else {
            self.capacity.clone()
        };
        validate_capacity(&capacity)?;

        Ok(FleetSettings {
            name: fleet.name.unwrap_or_else(|| DEFAULT_FLEET_NAME.to_string()),
            min_instances,
            max_instances,
            cooldown,
            poll_interval,
            max_sample_age,
            source_id: metric.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            steps,
            capacity,
        })
    }
}

/// Capacity classes must be non-empty, uniquely named, and carry some weight.
pub fn validate_capacity(classes: &[CapacityClass]) -> ConfigResult<()> {
    if classes.is_empty() {
        return Err(ConfigError::NoCapacityClasses);
    }

    let mut seen = HashSet::new();
    for class in classes {
        if class.name.trim().is_empty() {
            return Err(ConfigError::EmptyClassName);
        }
        if !seen.insert(class.name.as_str()) {
            return Err(ConfigError::DuplicateClass(class.name.clone()));
        }
    }

    if classes.iter().all(|c| c.weight == 0) {
        return Err(ConfigError::ZeroTotalWeight);
    }
    Ok(())
}

fn optional_duration(field: &'static str, value: Option<&str>) -> ConfigResult<Option<Duration>> {
    value
        .map(|v| {
            parse_duration(v).ok_or_else(|| ConfigError::InvalidDuration {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

/// Parse a duration string like "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };
    let n = digits.trim().parse::<u64>().ok()?;
    Some(Duration::from_millis(n.checked_mul(unit)?))
}
