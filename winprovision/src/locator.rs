use tracing::{debug, instrument};

use crate::element::{check_ready, UIElement};
use crate::errors::AutomationError;
use crate::platforms::AutomationBackend;
use crate::probe;
use crate::selector::Selector;
use crate::waiter::{WaitOutcome, WaitPolicy, Waiter};
use std::sync::Arc;

// Default policy if none is specified on the locator itself
const DEFAULT_LOCATOR_POLICY: WaitPolicy = WaitPolicy::from_millis(30_000, 500);

/// A high-level API for finding and waiting on controls
///
/// For maximum precision, prefer role|name format (e.g., "button|Finish")
/// over broad selectors like "role:Button" that could match multiple elements.
#[derive(Clone)]
pub struct Locator {
    backend: Arc<dyn AutomationBackend>,
    selector: Selector,
    policy: WaitPolicy, // Default policy for this locator instance
    root: Option<UIElement>,
}

impl Locator {
    /// Create a new locator with the given selector
    pub(crate) fn new(backend: Arc<dyn AutomationBackend>, selector: Selector) -> Self {
        Self {
            backend,
            selector,
            policy: DEFAULT_LOCATOR_POLICY,
            root: None,
        }
    }

    /// Set the wait policy used by the waiting methods.
    pub fn with_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the root element for this locator
    pub fn within(mut self, element: UIElement) -> Self {
        self.root = Some(element);
        self
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        let mut chain = match self.selector.clone() {
            Selector::Chain(existing) => existing,
            s => vec![s],
        };
        match selector.into() {
            Selector::Chain(mut parts) => chain.append(&mut parts),
            s => chain.push(s),
        }
        Locator {
            backend: self.backend.clone(),
            selector: Selector::Chain(chain),
            policy: self.policy,
            root: self.root.clone(),
        }
    }

    /// Look once, without waiting.
    pub fn find(&self) -> Result<Option<UIElement>, AutomationError> {
        self.backend.find_element(&self.selector, self.root.as_ref())
    }

    /// Wait until a matching element exists.
    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn wait(&self) -> Result<UIElement, AutomationError> {
        debug!("Waiting for element matching selector: {}", self.selector);
        Waiter::new(self.selector_string(), self.policy)
            .wait_async(probe::fallible(|| self.find()))
            .await?
            .into_result()
    }

    /// Wait until a matching element is visible and enabled, failing on timeout.
    pub async fn wait_ready(&self) -> Result<UIElement, AutomationError> {
        self.wait_ready_outcome().await?.into_result()
    }

    /// Wait until a matching element is visible and enabled, reporting a
    /// timeout as an outcome instead of an error.
    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn wait_ready_outcome(&self) -> Result<WaitOutcome<UIElement>, AutomationError> {
        let condition = format!("{} to be visible and enabled", self.selector_string());
        Waiter::new(condition, self.policy)
            .wait_async(probe::fallible(
                || -> Result<Option<UIElement>, AutomationError> {
                    match self.find()? {
                        Some(element) if check_ready(&element)? => Ok(Some(element)),
                        _ => Ok(None),
                    }
                },
            ))
            .await
    }

    pub fn selector_string(&self) -> String {
        self.selector.to_string()
    }
}
