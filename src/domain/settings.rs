use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_logging_enabled: default_true(),
            file_logging_enabled: default_false(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_target: default_true(),
            ansi_colors: default_true(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_gui_client".to_string()
}

/// What to do when a freshly generated request id is already pending.
/// The reference behavior is `Replace`; `Reject` fails the operation
/// instead of silently overwriting pending-set membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    #[default]
    Replace,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Advanced BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_gui_char_uuid")]
    pub ble_gui_char_uuid: String,

    // Protocol Settings
    #[serde(default = "default_max_send_retries")]
    pub max_send_retries: u32,
    #[serde(default)]
    pub request_id_collision: CollisionPolicy,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ble_service_uuid: default_service_uuid(),
            ble_gui_char_uuid: default_gui_char_uuid(),
            max_send_retries: default_max_send_retries(),
            request_id_collision: CollisionPolicy::default(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_service_uuid() -> String {
    "a6a2fc07-815c-4262-97a9-1cef5181a1e4".to_string()
}
fn default_gui_char_uuid() -> String {
    "013201e4-0873-4377-8bff-9a2389af3884".to_string()
}
fn default_max_send_retries() -> u32 {
    10
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BleGuiClient");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_json_round_trip() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_send_retries, 10);
        assert_eq!(parsed.request_id_collision, CollisionPolicy::Replace);
        assert_eq!(parsed.ble_gui_char_uuid, settings.ble_gui_char_uuid);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: Settings = serde_json::from_str(r#"{"max_send_retries": 3}"#).unwrap();
        assert_eq!(parsed.max_send_retries, 3);
        assert_eq!(parsed.ble_service_uuid, default_service_uuid());
        assert!(parsed.log_settings.console_logging_enabled);
    }

    #[test]
    fn collision_policy_wire_names() {
        let parsed: CollisionPolicy = serde_json::from_str(r#""reject""#).unwrap();
        assert_eq!(parsed, CollisionPolicy::Reject);
    }
}
