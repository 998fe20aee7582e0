//! Workflow configuration.
//!
//! Every field has a default taken from the field-tested provisioning runs, so an
//! empty file (or no file at all) is a valid configuration. Files may be YAML
//! (`.yaml`/`.yml`) or JSON (`.json`). Durations are written in seconds.

use crate::{AutomationError, WaitPolicy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// What a workflow does when a readiness wait runs out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    /// Abort the workflow with [`AutomationError::Timeout`]
    #[default]
    Hard,
    /// Log the timeout and end the workflow early without an error
    Soft,
}

/// How software packages get installed on first boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMethod {
    /// Run the command through the command runner and check its exit status
    #[default]
    Command,
    /// Type the command into a PowerShell window opened from the Run dialog
    RunDialog,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub mt5: Mt5Config,
    pub first_boot: FirstBootConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mt5Config {
    pub installer_path: String,
    pub require_elevation: bool,
    /// Wait for the installer process to show up
    pub launch: WaitPolicy,
    pub cpu_idle_threshold_percent: f32,
    pub cpu_idle: WaitPolicy,
    /// Regex matched against top-level window titles
    pub window_title_pattern: String,
    pub main_window: WaitPolicy,
    #[serde(rename = "settle_delay_seconds", with = "seconds")]
    pub settle_delay: Duration,
    /// Buttons clicked in order once the wizard is up
    pub wizard_buttons: Vec<String>,
    pub button: WaitPolicy,
    pub finish_button: String,
    pub finish: WaitPolicy,
    pub finish_timeout_mode: TimeoutMode,
    #[serde(rename = "post_finish_delay_seconds", with = "seconds")]
    pub post_finish_delay: Duration,
}

impl Default for Mt5Config {
    fn default() -> Self {
        Self {
            installer_path: "mt5setup.exe".to_string(),
            require_elevation: true,
            launch: WaitPolicy::from_millis(30_000, 1_000),
            cpu_idle_threshold_percent: 5.0,
            cpu_idle: WaitPolicy::from_millis(10_000, 1_000),
            window_title_pattern: ".*Meta.*".to_string(),
            main_window: WaitPolicy::from_millis(15_000, 500),
            settle_delay: Duration::from_secs(2),
            wizard_buttons: vec!["Next".to_string(), "Next".to_string()],
            button: WaitPolicy::from_millis(10_000, 500),
            finish_button: "Finish".to_string(),
            finish: WaitPolicy::from_millis(900_000, 5_000),
            finish_timeout_mode: TimeoutMode::Soft,
            post_finish_delay: Duration::from_secs(5),
        }
    }
}

/// A package installed during first boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// PowerShell script that installs the package
    pub command: String,
}

const CHROME_INSTALL_COMMAND: &str = r#"$Path = $env:TEMP;
$Installer = "chrome_installer.exe";
Invoke-WebRequest "https://dl.google.com/chrome/install/latest/chrome_installer.exe" -OutFile $Path\$Installer;
Start-Process -FilePath $Path\$Installer -Args "/silent /install" -Verb RunAs -Wait;
Remove-Item $Path\$Installer"#;

impl PackageSpec {
    pub fn chrome() -> Self {
        Self {
            name: "Chrome".to_string(),
            command: CHROME_INSTALL_COMMAND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstBootConfig {
    /// Grace period before anything is probed
    #[serde(rename = "boot_delay_seconds", with = "seconds")]
    pub boot_delay: Duration,
    /// Pause after every synthetic key action
    #[serde(rename = "action_pause_seconds", with = "seconds")]
    pub action_pause: Duration,
    /// Extra wait after opening a window (PowerShell, Settings)
    #[serde(rename = "window_open_delay_seconds", with = "seconds")]
    pub window_open_delay: Duration,
    pub ready: WaitPolicy,
    pub ready_timeout_mode: TimeoutMode,
    pub start_button_image: PathBuf,
    pub start_button_confidence: f32,
    pub install_method: InstallMethod,
    pub packages: Vec<PackageSpec>,
    pub run_dialog_keys: String,
    pub settings_keys: String,
    pub settings_query: String,
}

impl Default for FirstBootConfig {
    fn default() -> Self {
        Self {
            boot_delay: Duration::from_secs(60),
            action_pause: Duration::from_millis(1_500),
            window_open_delay: Duration::from_secs(2),
            ready: WaitPolicy::from_millis(300_000, 5_000),
            ready_timeout_mode: TimeoutMode::Hard,
            start_button_image: PathBuf::from("start_button.png"),
            start_button_confidence: 0.8,
            install_method: InstallMethod::Command,
            packages: vec![PackageSpec::chrome()],
            run_dialog_keys: "{win}(r)".to_string(),
            settings_keys: "{win}(i)".to_string(),
            settings_query: "system".to_string(),
        }
    }
}

impl ProvisionConfig {
    /// Load a YAML or JSON file, picking the format from the extension.
    pub fn from_file(path: &Path) -> Result<Self, AutomationError> {
        let contents = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        debug!("loading configuration from {}", path.display());
        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents)?,
            Some("json") => Self::from_json_str(&contents)?,
            _ => {
                return Err(AutomationError::Config(format!(
                    "unsupported configuration format '{}', expected .yaml, .yml or .json",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, AutomationError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| AutomationError::Config(e.to_string()))
    }

    pub fn from_json_str(contents: &str) -> Result<Self, AutomationError> {
        serde_json::from_str(contents).map_err(|e| AutomationError::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String, AutomationError> {
        serde_yaml::to_string(self).map_err(|e| AutomationError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        self.mt5.title_regex()?;
        if self.mt5.wizard_buttons.iter().any(|b| b.trim().is_empty()) {
            return Err(AutomationError::Config(
                "mt5.wizard_buttons must not contain empty titles".to_string(),
            ));
        }
        if self.mt5.finish_button.trim().is_empty() {
            return Err(AutomationError::Config(
                "mt5.finish_button must not be empty".to_string(),
            ));
        }
        crate::vision::check_confidence(self.first_boot.start_button_confidence).map_err(|e| {
            AutomationError::Config(format!("first_boot.start_button_confidence: {e}"))
        })?;
        if let Some(package) = self
            .first_boot
            .packages
            .iter()
            .find(|p| p.name.trim().is_empty() || p.command.trim().is_empty())
        {
            return Err(AutomationError::Config(format!(
                "package '{}' needs both a name and a command",
                package.name
            )));
        }
        Ok(())
    }
}

impl Mt5Config {
    pub fn title_regex(&self) -> Result<Regex, AutomationError> {
        Regex::new(&self.window_title_pattern).map_err(|e| {
            AutomationError::Config(format!(
                "invalid mt5.window_title_pattern '{}': {e}",
                self.window_title_pattern
            ))
        })
    }
}

/// Serialize a `Duration` as floating-point seconds
mod seconds {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
