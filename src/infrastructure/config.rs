use crate::application::rule_editor::RepeatPeriod;
use crate::domain::recurrence::Feb29Policy;
use crate::infrastructure::error::InfraError;
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULTS_JSON: &str = "defaults.json";

const FALLBACK_START_OF_DAY: &str = "00:00";
const FALLBACK_UNDO_HISTORY: u64 = 12;

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "AlarmDeck",
                "timezone": "UTC",
                "startOfDay": "00:00",
                "undoHistorySize": 12
            }),
        ),
        (
            DEFAULTS_JSON,
            serde_json::json!({
                "schema": 1,
                "recurPeriod": "none",
                "feb29Policy": "none"
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn read_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let Some(name) = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(Tz::UTC);
    };
    name.parse()
        .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone '{name}'")))
}

pub fn read_start_of_day(config_dir: &Path) -> Result<NaiveTime, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let value = app
        .get("startOfDay")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(FALLBACK_START_OF_DAY);
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| InfraError::InvalidConfig(format!("startOfDay must be HH:MM, got '{value}'")))
}

pub fn read_undo_history_size(config_dir: &Path) -> Result<usize, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let size = app
        .get("undoHistorySize")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(FALLBACK_UNDO_HISTORY);
    if size < 2 {
        return Err(InfraError::InvalidConfig(
            "undoHistorySize must be at least 2".to_string(),
        ));
    }
    Ok(size as usize)
}

pub fn read_default_recur_period(config_dir: &Path) -> Result<RepeatPeriod, InfraError> {
    let defaults = read_config(&config_dir.join(DEFAULTS_JSON))?;
    let value = defaults
        .get("recurPeriod")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or("none");
    match value.to_ascii_lowercase().as_str() {
        "none" => Ok(RepeatPeriod::None),
        "at_login" => Ok(RepeatPeriod::AtLogin),
        "sub_daily" => Ok(RepeatPeriod::SubDaily),
        "daily" => Ok(RepeatPeriod::Daily),
        "weekly" => Ok(RepeatPeriod::Weekly),
        "monthly" => Ok(RepeatPeriod::Monthly),
        "yearly" => Ok(RepeatPeriod::Yearly),
        other => Err(InfraError::InvalidConfig(format!(
            "invalid recurPeriod '{other}'"
        ))),
    }
}

pub fn read_default_feb29_policy(config_dir: &Path) -> Result<Feb29Policy, InfraError> {
    let defaults = read_config(&config_dir.join(DEFAULTS_JSON))?;
    let value = defaults
        .get("feb29Policy")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or("none");
    match value.to_ascii_lowercase().as_str() {
        "none" => Ok(Feb29Policy::None),
        "mar1" => Ok(Feb29Policy::Mar1),
        "feb28" => Ok(Feb29Policy::Feb28),
        other => Err(InfraError::InvalidConfig(format!(
            "invalid feb29Policy '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_ID: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "alarmdeck-config-{}-{sequence}",
                std::process::id()
            ));
            fs::create_dir_all(&path).expect("create temp directory");
            ensure_default_configs(&path).expect("initialize default configs");
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }

        fn write_app(&self, value: serde_json::Value) {
            let formatted = serde_json::to_string_pretty(&value).expect("serialize");
            fs::write(self.path.join(APP_JSON), formatted).expect("write app.json");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_created_and_readable() {
        let temp = TempConfigDir::new();
        assert_eq!(read_timezone(temp.path()).expect("timezone"), Tz::UTC);
        assert_eq!(
            read_start_of_day(temp.path()).expect("start of day"),
            NaiveTime::from_hms_opt(0, 0, 0).expect("valid time")
        );
        assert_eq!(read_undo_history_size(temp.path()).expect("size"), 12);
        assert_eq!(
            read_default_recur_period(temp.path()).expect("period"),
            RepeatPeriod::None
        );
        assert_eq!(
            read_default_feb29_policy(temp.path()).expect("policy"),
            Feb29Policy::None
        );
    }

    #[test]
    fn custom_app_settings_are_honoured() {
        let temp = TempConfigDir::new();
        temp.write_app(serde_json::json!({
            "schema": 1,
            "timezone": "Europe/Berlin",
            "startOfDay": "06:30",
            "undoHistorySize": 30
        }));
        assert_eq!(
            read_timezone(temp.path()).expect("timezone"),
            chrono_tz::Europe::Berlin
        );
        assert_eq!(
            read_start_of_day(temp.path()).expect("start of day"),
            NaiveTime::from_hms_opt(6, 30, 0).expect("valid time")
        );
        assert_eq!(read_undo_history_size(temp.path()).expect("size"), 30);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let temp = TempConfigDir::new();
        temp.write_app(serde_json::json!({
            "schema": 1,
            "timezone": "Mars/Olympus",
        }));
        assert!(read_timezone(temp.path()).is_err());

        temp.write_app(serde_json::json!({
            "schema": 1,
            "startOfDay": "6 am",
        }));
        assert!(read_start_of_day(temp.path()).is_err());

        temp.write_app(serde_json::json!({
            "schema": 2,
        }));
        assert!(read_undo_history_size(temp.path()).is_err());
    }
}
