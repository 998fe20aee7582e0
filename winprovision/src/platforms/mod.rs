use crate::{AutomationError, ScreenshotResult, Selector, UIElement};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

/// The common trait that platform-specific backends must implement
///
/// Every lookup is single-shot: "not there yet" is `Ok(None)` and an `Err` is a
/// genuine failure. Waiting is the caller's job (see [`crate::Waiter`]).
pub trait AutomationBackend: Send + Sync {
    /// Whether the current process runs with administrator rights
    fn is_elevated(&self) -> Result<bool, AutomationError>;

    /// Start `program` again through the elevation prompt, in `working_dir`
    fn relaunch_elevated(
        &self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<(), AutomationError>;

    /// Start an executable and return its process id
    fn launch_application(&self, path: &str) -> Result<u32, AutomationError>;

    /// CPU usage of a process in percent, `None` once the process is gone
    fn process_cpu_usage(&self, pid: u32) -> Result<Option<f32>, AutomationError>;

    /// First top-level window whose title matches, optionally owned by `pid`
    fn find_window(
        &self,
        title_pattern: &Regex,
        pid: Option<u32>,
    ) -> Result<Option<UIElement>, AutomationError>;

    /// First element matching the selector below `root` (or the desktop)
    fn find_element(
        &self,
        selector: &Selector,
        root: Option<&UIElement>,
    ) -> Result<Option<UIElement>, AutomationError>;

    /// Send a key sequence such as `{win}(r)` or `{enter}` to the focused window
    fn send_keys(&self, keys: &str) -> Result<(), AutomationError>;

    /// Type literal text into the focused window
    fn type_text(&self, text: &str) -> Result<(), AutomationError>;

    /// Capture the primary monitor
    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError>;
}

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the backend for the current platform
pub fn create_backend() -> Result<Arc<dyn AutomationBackend>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsBackend::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "desktop provisioning is only available on Windows".to_string(),
        ))
    }
}
