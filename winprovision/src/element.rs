use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::{debug, instrument};

/// Snapshot of the properties readiness checks look at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UIElementAttributes {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

/// Interface for platform-specific element implementations
pub trait UIElementImpl: Send + Sync + Debug {
    fn role(&self) -> String;
    fn name(&self) -> Option<String>;
    fn process_id(&self) -> Result<u32, AutomationError>;
    fn is_enabled(&self) -> Result<bool, AutomationError>;
    fn is_visible(&self) -> Result<bool, AutomationError>;
    fn click(&self) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Represents a window or control of a running application
#[derive(Debug)]
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

impl UIElement {
    /// Create a new UI element from a platform-specific implementation
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn role(&self) -> String {
        self.inner.role()
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name()
    }

    pub fn name_or_empty(&self) -> String {
        self.name().unwrap_or_default()
    }

    pub fn process_id(&self) -> Result<u32, AutomationError> {
        self.inner.process_id()
    }

    pub fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.inner.is_enabled()
    }

    pub fn is_visible(&self) -> Result<bool, AutomationError> {
        self.inner.is_visible()
    }

    /// Visible and enabled, i.e. safe to click.
    pub fn is_ready(&self) -> Result<bool, AutomationError> {
        Ok(self.is_visible()? && self.is_enabled()?)
    }

    /// Click on this element
    #[instrument(level = "debug", skip(self), fields(name = ?self.name()))]
    pub fn click(&self) -> Result<(), AutomationError> {
        if !self.is_enabled()? {
            return Err(AutomationError::ElementNotEnabled(self.name_or_empty()));
        }
        self.inner.click()
    }

    pub fn attributes(&self) -> UIElementAttributes {
        UIElementAttributes {
            role: self.role(),
            name: self.name(),
            process_id: self.process_id().ok(),
            enabled: self.is_enabled().ok(),
            visible: self.is_visible().ok(),
        }
    }

    /// Borrow the platform element, e.g. to downcast in a backend.
    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

/// Readiness check shared by windows and controls: `Ok(true)` only when
/// the element is both visible and enabled. Property reads that fail because
/// the element went away count as "not ready".
pub(crate) fn check_ready(element: &UIElement) -> Result<bool, AutomationError> {
    match element.is_ready() {
        Ok(ready) => Ok(ready),
        Err(AutomationError::ElementNotFound(reason)) => {
            debug!("element vanished while checking readiness: {}", reason);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
