// Tests for the automation policy document

use crate::config::{AutomationConfig, DelayBounds, SharedConfig};
use crate::error::ConfigError;
use crate::lcu::{ActionKind, Position};
use std::time::Duration;

#[cfg(test)]
mod config_tests {
  use super::*;

  /// Test: A partial document keeps defaults for missing fields
  #[test]
  fn test_partial_document_uses_defaults() {
    let config = AutomationConfig::from_json_str(r#"{ "auto_ban": true }"#).unwrap();
    assert!(config.auto_ban);
    assert!(config.auto_accept);
    assert!(config.smart_timing);
    assert_eq!(config.ban_delay_seconds, 3);
    assert_eq!(config.monitor.poll_interval(), Duration::from_millis(1000));
  }

  /// Test: Delays outside the bounds are clamped, not rejected
  #[test]
  fn test_delays_are_clamped() {
    let config = AutomationConfig::from_json_str(r#"{ "ban_delay_seconds": 0, "pick_delay_seconds": 45 }"#).unwrap();
    assert_eq!(config.ban_delay_seconds, 1);
    assert_eq!(config.pick_delay_seconds, 10);

    let wide = AutomationConfig::from_json_str(
      r#"{ "pick_delay_seconds": 45, "delay_bounds": { "min": 1, "max": 30 } }"#,
    )
    .unwrap();
    assert_eq!(wide.pick_delay_seconds, 30);
  }

  /// Test: Thresholds are clamped even on a hand-built config
  #[test]
  fn test_thresholds_clamped_without_normalizing() {
    let config = AutomationConfig {
      ban_delay_seconds: 0,
      pick_delay_seconds: 99,
      ..AutomationConfig::default()
    };
    assert_eq!(config.ban_threshold_seconds(), 1.0);
    assert_eq!(config.pick_threshold_seconds(), 10.0);
  }

  /// Test: Inverted bounds are a config error
  #[test]
  fn test_inverted_bounds_rejected() {
    let result = AutomationConfig::from_json_str(r#"{ "delay_bounds": { "min": 10, "max": 2 } }"#);
    assert!(matches!(result, Err(ConfigError::InvalidBounds { min: 10, max: 2 })));
  }

  /// Test: Malformed JSON is reported as a parse error
  #[test]
  fn test_malformed_json() {
    let result = AutomationConfig::from_json_str("{ not json");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
  }

  /// Test: Lane queues load by lowercase position name
  #[test]
  fn test_position_queues_from_json() {
    let config = AutomationConfig::from_json_str(
      r#"{
        "position_based_selection": true,
        "positions": {
          "bottom": { "pick_champions": [ { "champion_id": 222, "key": "Jinx", "name": "Jinx" } ] }
        }
      }"#,
    )
    .unwrap();

    let prefs = config.position_preferences(Some(Position::Bottom)).unwrap();
    assert_eq!(prefs.pick_champions[0].champion_id, Some(222));
    assert!(prefs.ban_champions.is_empty());
    assert!(config.position_preferences(Some(Position::Top)).is_none());
    assert!(config.position_preferences(None).is_none());
  }

  /// Test: Monitor intervals are clamped to sane ranges
  #[test]
  fn test_monitor_settings_clamped() {
    let config = AutomationConfig::from_json_str(
      r#"{ "monitor": { "poll_interval_ms": 10, "recheck_interval_ms": 60000, "failure_threshold": 0, "action_concurrency": 0 } }"#,
    )
    .unwrap();
    assert_eq!(config.monitor.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.monitor.recheck_interval(), Duration::from_millis(2000));
    assert_eq!(config.monitor.failure_threshold(), 1);
    assert_eq!(config.monitor.action_concurrency(), 1);
  }

  /// Test: Delay bounds clamp into their own range
  #[test]
  fn test_delay_bounds_clamp() {
    let bounds = DelayBounds { min: 2, max: 5 };
    assert_eq!(bounds.clamp(1), 2);
    assert_eq!(bounds.clamp(4), 4);
    assert_eq!(bounds.clamp(9), 5);
  }

  /// Test: Shared config updates are visible to the next snapshot only
  #[test]
  fn test_shared_config_snapshot() {
    let shared = SharedConfig::new(AutomationConfig::default());
    let before = shared.snapshot();

    shared.update(|config| config.auto_pick = true);

    assert!(!before.auto_pick);
    assert!(shared.snapshot().auto_pick);
  }

  /// Test: Simple delays clamp to 1-30s and only apply when enabled
  #[test]
  fn test_simple_delay_settings() {
    let config = AutomationConfig::from_json_str(
      r#"{ "simple_delay_ban": true, "simple_ban_delay_seconds": 45, "simple_pick_delay_seconds": 0 }"#,
    )
    .unwrap();
    assert_eq!(config.simple_ban_delay_seconds, 30);
    assert_eq!(config.simple_pick_delay_seconds, 1);
    assert_eq!(config.simple_delay_for(ActionKind::Ban), Some(Duration::from_secs(30)));
    assert_eq!(config.simple_delay_for(ActionKind::Pick), None);
    assert!(!config.auto_hover);
  }

  /// Test: Retry, floor and reconnect settings have sane defaults
  #[test]
  fn test_monitor_timing_defaults() {
    let settings = AutomationConfig::default().monitor;
    assert_eq!(settings.min_remaining_seconds(ActionKind::Ban), 0.2);
    assert_eq!(settings.min_remaining_seconds(ActionKind::Pick), 0.5);
    assert_eq!(settings.commit_retry_delay(), Duration::from_secs(1));
    assert_eq!(settings.reconnect_interval(), Duration::from_secs(10));
  }
}
