/// View configuration.
///
/// Every setting has a default, so a host only spells out what it changes:
///
/// ```
/// use livegrid::ViewConfig;
///
/// let config = ViewConfig::from_json(r#"{
///     "max_sorting_field_count": 2,
///     "recent_changes": { "value_changed_ms": 250 }
/// }"#).unwrap();
///
/// assert_eq!(config.max_sorting_field_count, 2);
/// assert_eq!(config.recent_changes.value_changed_ms, 250);
/// assert_eq!(config.recent_changes.inserted_ms, 1000);
/// assert!(config.continuous_filtering);
/// ```

use serde::{Deserialize, Serialize};

/// Decay durations, in milliseconds, for each recent-change category.
/// A duration of zero disables tracking for that category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentChangeDurations {
    pub all_changed_ms: u64,
    pub inserted_ms: u64,
    pub updated_ms: u64,
    pub value_changed_ms: u64,
}

impl RecentChangeDurations {
    /// Every category disabled.
    pub fn disabled() -> Self {
        RecentChangeDurations {
            all_changed_ms: 0,
            inserted_ms: 0,
            updated_ms: 0,
            value_changed_ms: 0,
        }
    }
}

impl Default for RecentChangeDurations {
    fn default() -> Self {
        RecentChangeDurations {
            all_changed_ms: 0,
            inserted_ms: 1000,
            updated_ms: 1000,
            value_changed_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Upper bound on the number of sort specifiers kept at once
    pub max_sorting_field_count: usize,
    /// Re-evaluate the filter on every single-record invalidation; when off
    /// the filter is only re-run by `invalidate_filtering`
    pub continuous_filtering: bool,
    pub recent_changes: RecentChangeDurations,
    pub row_order_reversed: bool,
    /// Run the structural consistency check at the end of every outermost
    /// change bracket
    pub consistency_checks: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            max_sorting_field_count: 3,
            continuous_filtering: true,
            recent_changes: RecentChangeDurations::default(),
            row_order_reversed: false,
            consistency_checks: cfg!(debug_assertions),
        }
    }
}

impl ViewConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: ViewConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid view config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("Failed to serialize view config: {}", e))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_sorting_field_count == 0 {
            return Err("max_sorting_field_count must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.max_sorting_field_count, 3);
        assert!(config.continuous_filtering);
        assert!(!config.row_order_reversed);
        assert_eq!(config.recent_changes.all_changed_ms, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_empty_object_uses_defaults() {
        let config = ViewConfig::from_json("{}").unwrap();
        assert_eq!(config, ViewConfig::default());
    }

    #[test]
    fn test_from_json_rejects_zero_sort_fields() {
        let result = ViewConfig::from_json(r#"{ "max_sorting_field_count": 0 }"#);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("at least 1"));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let result = ViewConfig::from_json("{ not json");
        assert!(result.unwrap_err().starts_with("Invalid view config"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = ViewConfig {
            row_order_reversed: true,
            recent_changes: RecentChangeDurations::disabled(),
            ..ViewConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(ViewConfig::from_json(&json).unwrap(), config);
    }
}
