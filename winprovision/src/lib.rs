//! Unattended Windows desktop provisioning
//!
//! The core of this crate is a bounded readiness wait ([`Waiter`]): poll a probe on
//! a fixed cadence until it reports ready, faults, or the deadline passes. The
//! [`Desktop`] facade builds UI readiness checks (windows, controls, processes,
//! on-screen images) on top of it, and [`workflows`] strings those checks into the
//! installer and first-boot sequences.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

pub mod command;
pub mod config;
pub mod element;
pub mod errors;
pub mod locator;
pub mod platforms;
pub mod probe;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod vision;
pub mod waiter;
pub mod workflows;

pub use command::{CommandOutput, CommandRunner, PowerShellRunner};
pub use config::{InstallMethod, ProvisionConfig, TimeoutMode};
pub use element::{UIElement, UIElementAttributes, UIElementImpl};
pub use errors::AutomationError;
pub use locator::Locator;
pub use platforms::AutomationBackend;
pub use selector::Selector;
pub use vision::TemplateMatch;
pub use waiter::{
    wait_for, wait_for_async, Readiness, ReadinessProbe, WaitOutcome, WaitPolicy, Waiter,
};

/// Holds the screenshot data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotResult {
    /// Raw RGBA image data
    pub image_data: Vec<u8>,
    /// Width of the image
    pub width: u32,
    /// Height of the image
    pub height: u32,
}

/// The main entry point for UI readiness checks
#[derive(Clone)]
pub struct Desktop {
    backend: Arc<dyn AutomationBackend>,
}

impl Desktop {
    /// Connect to the platform backend.
    #[instrument]
    pub fn new() -> Result<Self, AutomationError> {
        let backend = platforms::create_backend()?;
        Ok(Self { backend })
    }

    pub fn with_backend(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn AutomationBackend> {
        &self.backend
    }

    /// Create a locator for controls matching `selector`.
    pub fn locator(&self, selector: impl Into<Selector>) -> Result<Locator, AutomationError> {
        let selector = selector.into();
        if !selector.is_valid() {
            return Err(AutomationError::InvalidSelector(selector.to_string()));
        }
        Ok(Locator::new(self.backend.clone(), selector))
    }

    /// Wait for a top-level window whose title matches and that is visible and enabled.
    #[instrument(level = "debug", skip(self, title_pattern), fields(pattern = %title_pattern))]
    pub async fn wait_for_window(
        &self,
        title_pattern: &Regex,
        pid: Option<u32>,
        policy: WaitPolicy,
    ) -> Result<WaitOutcome<UIElement>, AutomationError> {
        let condition = format!("window matching '{title_pattern}'");
        Waiter::new(condition, policy)
            .wait_async(probe::fallible(
                || -> Result<Option<UIElement>, AutomationError> {
                    match self.backend.find_window(title_pattern, pid)? {
                        Some(window) if element::check_ready(&window)? => Ok(Some(window)),
                        Some(_) => {
                            debug!("window found but not ready yet");
                            Ok(None)
                        }
                        None => Ok(None),
                    }
                },
            ))
            .await
    }

    /// Wait until `pid` shows up in the process table.
    pub async fn wait_for_process(
        &self,
        pid: u32,
        policy: WaitPolicy,
    ) -> Result<WaitOutcome<()>, AutomationError> {
        Waiter::new(format!("process {pid} to start"), policy)
            .wait_async(probe::blocking(probe::fallible(|| {
                self.backend
                    .process_cpu_usage(pid)
                    .map(|usage| usage.map(|_| ()))
            })))
            .await
    }

    /// Wait until a process settles below `threshold_percent` CPU.
    ///
    /// A process that exits during the wait is a fault, not a retry.
    pub async fn wait_for_cpu_idle(
        &self,
        pid: u32,
        threshold_percent: f32,
        policy: WaitPolicy,
    ) -> Result<WaitOutcome<f32>, AutomationError> {
        let condition = format!("process {pid} CPU usage below {threshold_percent}%");
        Waiter::new(condition, policy)
            .wait_async(probe::blocking(probe::fallible(
                || -> Result<Option<f32>, AutomationError> {
                    match self.backend.process_cpu_usage(pid)? {
                        Some(usage) if usage < threshold_percent => Ok(Some(usage)),
                        Some(usage) => {
                            debug!("process {} still busy at {:.1}% CPU", pid, usage);
                            Ok(None)
                        }
                        None => Err(AutomationError::PlatformError(format!(
                            "process {pid} exited while waiting for it to become idle"
                        ))),
                    }
                },
            )))
            .await
    }

    /// Wait until `template` appears on the primary screen.
    ///
    /// `confidence` must be in (0, 1].
    pub async fn wait_for_image(
        &self,
        label: &str,
        template: &image::GrayImage,
        confidence: f32,
        policy: WaitPolicy,
    ) -> Result<WaitOutcome<TemplateMatch>, AutomationError> {
        vision::check_confidence(confidence)?;
        Waiter::new(format!("{label} to appear on screen"), policy)
            .wait_async(probe::blocking(probe::fallible(
                || -> Result<Option<TemplateMatch>, AutomationError> {
                    let screenshot = self.backend.capture_screen()?;
                    let screen = vision::screenshot_to_gray(&screenshot)?;
                    Ok(vision::locate(&screen, template, confidence))
                },
            )))
            .await
    }
}
