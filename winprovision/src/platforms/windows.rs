#![allow(clippy::arc_with_non_send_sync)]

use crate::element::UIElementImpl;
use crate::platforms::AutomationBackend;
use crate::selector::name_matches;
use crate::{AutomationError, ScreenshotResult, Selector, UIElement};
use regex::Regex;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info};
use uiautomation::controls::ControlType;
use uiautomation::errors::{ERR_NOTFOUND, ERR_TIMEOUT};
use uiautomation::filters::ClassNameFilter;
use uiautomation::inputs::Keyboard;
use uiautomation::patterns;
use uiautomation::UIAutomation;

// windows imports
use windows::core::{HRESULT, HSTRING, PCWSTR};
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};
use windows::Win32::System::Threading::GetProcessId;
use windows::Win32::UI::Shell::{
    IsUserAnAdmin, ShellExecuteExW, ShellExecuteW, SEE_MASK_NOASYNC, SEE_MASK_NOCLOSEPROCESS,
    SHELLEXECUTEINFOW,
};
use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

// Top-level windows are children of the desktop, dialogs may sit one level lower
const WINDOW_SEARCH_DEPTH: u32 = 2;
const ELEMENT_SEARCH_DEPTH: u32 = 50;
const KEY_INTERVAL_MS: u64 = 10;

// thread-safety
#[derive(Clone)]
pub struct ThreadSafeWinUIAutomation(Arc<UIAutomation>);

// send and sync for wrapper
unsafe impl Send for ThreadSafeWinUIAutomation {}
unsafe impl Sync for ThreadSafeWinUIAutomation {}

#[derive(Clone)]
pub struct ThreadSafeWinUIElement(Arc<uiautomation::UIElement>);

unsafe impl Send for ThreadSafeWinUIElement {}
unsafe impl Sync for ThreadSafeWinUIElement {}

pub struct WindowsBackend {
    automation: ThreadSafeWinUIAutomation,
    system: Mutex<System>,
}

impl WindowsBackend {
    pub fn new() -> Result<Self, AutomationError> {
        // Initialize COM in multithreaded mode for thread safety
        unsafe {
            let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
            if hr.is_err() && hr != HRESULT(0x80010106u32 as i32) {
                // Only return error if it's not the "already initialized" case
                return Err(AutomationError::PlatformError(format!(
                    "Failed to initialize COM in multithreaded mode: {hr}"
                )));
            }
            if hr == HRESULT(0x80010106u32 as i32) {
                debug!("COM already initialized in this thread");
            }
        }

        let automation = UIAutomation::new_direct()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))?;
        Ok(Self {
            automation: ThreadSafeWinUIAutomation(Arc::new(automation)),
            system: Mutex::new(System::new()),
        })
    }

    fn lock_system(&self) -> Result<MutexGuard<'_, System>, AutomationError> {
        self.system
            .lock()
            .map_err(|e| AutomationError::Internal(format!("process table lock poisoned: {e}")))
    }

    fn root_element(&self) -> Result<uiautomation::UIElement, AutomationError> {
        self.automation
            .0
            .get_root_element()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get desktop: {e}")))
    }

    fn find_below(
        &self,
        selector: &Selector,
        root: &uiautomation::UIElement,
    ) -> Result<Option<uiautomation::UIElement>, AutomationError> {
        let matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(root)
            .depth(ELEMENT_SEARCH_DEPTH)
            .timeout(0);

        let matcher = match selector {
            Selector::Role { role, name } => {
                let matcher = matcher.control_type(map_generic_role_to_win_roles(role));
                match name {
                    Some(name) => matcher.filter_fn(name_filter(name)),
                    None => matcher,
                }
            }
            Selector::Name(name) => matcher.filter_fn(name_filter(name)),
            Selector::ClassName(classname) => matcher.filter(Box::new(ClassNameFilter {
                classname: classname.clone(),
            })),
            Selector::NativeId(automation_id) => {
                let wanted = automation_id.clone();
                matcher.filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                    Ok(e.get_automation_id().map(|id| id == wanted).unwrap_or(false))
                }))
            }
            Selector::Chain(parts) => {
                let mut current = root.clone();
                for part in parts {
                    match self.find_below(part, &current)? {
                        Some(found) => current = found,
                        None => return Ok(None),
                    }
                }
                return Ok(Some(current));
            }
            Selector::Invalid(reason) => {
                return Err(AutomationError::InvalidSelector(reason.clone()));
            }
        };

        debug!("searching element by selector: {}", selector);
        match matcher.find_first() {
            Ok(element) => Ok(Some(element)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(AutomationError::PlatformError(format!(
                "UI Automation search for {selector} failed: {e}"
            ))),
        }
    }
}

// Wizard buttons carry mnemonics and arrows ("&Next >"), so names match partially
fn name_filter(
    wanted: &str,
) -> Box<dyn Fn(&uiautomation::UIElement) -> uiautomation::Result<bool>> {
    let wanted = wanted.to_string();
    Box::new(move |e: &uiautomation::UIElement| {
        let name = e.get_name().unwrap_or_default();
        Ok(name_matches(&wanted, &name))
    })
}

fn is_not_found(e: &uiautomation::Error) -> bool {
    matches!(e.code(), ERR_NOTFOUND | ERR_TIMEOUT)
}

fn wrap(element: uiautomation::UIElement) -> UIElement {
    UIElement::new(Box::new(WindowsUIElement {
        element: ThreadSafeWinUIElement(Arc::new(element)),
    }))
}

impl AutomationBackend for WindowsBackend {
    fn is_elevated(&self) -> Result<bool, AutomationError> {
        Ok(unsafe { IsUserAnAdmin() }.as_bool())
    }

    fn relaunch_elevated(
        &self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<(), AutomationError> {
        let params = args
            .iter()
            .map(|arg| {
                if arg.contains(' ') {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            "Relaunching {} elevated in {}",
            program.display(),
            working_dir.display()
        );

        let verb = HSTRING::from("runas");
        let file = HSTRING::from(program.as_os_str());
        let params = HSTRING::from(params.as_str());
        // runas starts in System32 unless told otherwise
        let directory = HSTRING::from(working_dir.as_os_str());
        let hinstance = unsafe {
            ShellExecuteW(
                None,
                PCWSTR(verb.as_ptr()),
                PCWSTR(file.as_ptr()),
                PCWSTR(params.as_ptr()),
                PCWSTR(directory.as_ptr()),
                SW_SHOWNORMAL,
            )
        };

        // HINSTANCE returned by ShellExecuteW is not a real HRESULT, but a value > 32 on success.
        if hinstance.0 as i32 <= 32 {
            return Err(AutomationError::PermissionDenied(format!(
                "Elevation request failed. ShellExecuteW returned error code: {}",
                hinstance.0 as i32
            )));
        }
        Ok(())
    }

    fn launch_application(&self, path: &str) -> Result<u32, AutomationError> {
        info!("Launching application: {}", path);
        let verb = HSTRING::from("open");
        let file = HSTRING::from(path);
        unsafe {
            let mut sei = SHELLEXECUTEINFOW {
                cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
                fMask: SEE_MASK_NOCLOSEPROCESS | SEE_MASK_NOASYNC,
                lpVerb: PCWSTR(verb.as_ptr()),
                lpFile: PCWSTR(file.as_ptr()),
                nShow: SW_SHOWNORMAL.0,
                ..Default::default()
            };

            ShellExecuteExW(&mut sei).map_err(|e| {
                AutomationError::PlatformError(format!("Failed to launch '{path}': {e}"))
            })?;

            let pid = GetProcessId(sei.hProcess);
            let _ = CloseHandle(sei.hProcess);
            if pid == 0 {
                return Err(AutomationError::PlatformError(format!(
                    "Launched '{path}' but could not resolve its process id"
                )));
            }
            debug!("'{}' started with pid {}", path, pid);
            Ok(pid)
        }
    }

    fn process_cpu_usage(&self, pid: u32) -> Result<Option<f32>, AutomationError> {
        let pid = Pid::from_u32(pid);

        // cpu usage is computed from the delta between two refreshes
        self.lock_system()?
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        let mut system = self.lock_system()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        Ok(system.process(pid).map(|process| process.cpu_usage()))
    }

    fn find_window(
        &self,
        title_pattern: &Regex,
        pid: Option<u32>,
    ) -> Result<Option<UIElement>, AutomationError> {
        let root = self.root_element()?;
        let pattern = title_pattern.clone();
        let matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root)
            .control_type(ControlType::Window)
            .filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                let title_matches = e
                    .get_name()
                    .map(|name| pattern.is_match(&name))
                    .unwrap_or(false);
                let pid_matches = match pid {
                    Some(pid) => e.get_process_id().map(|p| p as u32 == pid).unwrap_or(false),
                    None => true,
                };
                Ok(title_matches && pid_matches)
            }))
            .depth(WINDOW_SEARCH_DEPTH)
            .timeout(0);

        match matcher.find_first() {
            Ok(element) => {
                debug!("Found window: {}", element.get_name().unwrap_or_default());
                Ok(Some(wrap(element)))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(AutomationError::PlatformError(format!(
                "Window search for '{title_pattern}' failed: {e}"
            ))),
        }
    }

    fn find_element(
        &self,
        selector: &Selector,
        root: Option<&UIElement>,
    ) -> Result<Option<UIElement>, AutomationError> {
        let root_ele = match root.and_then(|el| el.as_any().downcast_ref::<WindowsUIElement>()) {
            Some(ele) => ele.element.0.as_ref().clone(),
            None => self.root_element()?,
        };
        Ok(self.find_below(selector, &root_ele)?.map(wrap))
    }

    fn send_keys(&self, keys: &str) -> Result<(), AutomationError> {
        debug!("sending keys: {}", keys);
        Keyboard::new()
            .interval(KEY_INTERVAL_MS)
            .send_keys(keys)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to send keys: {e}")))
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        debug!("typing {} characters", text.chars().count());
        Keyboard::new()
            .interval(KEY_INTERVAL_MS)
            .send_text(text)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to type text: {e}")))
    }

    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        let monitors = xcap::Monitor::all().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to get monitors: {e}"))
        })?;
        let mut primary_monitor: Option<xcap::Monitor> = None;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => {
                    primary_monitor = Some(monitor);
                    break;
                }
                Ok(false) => continue,
                Err(e) => {
                    return Err(AutomationError::PlatformError(format!(
                        "Error checking monitor primary status: {e}"
                    )));
                }
            }
        }
        let primary_monitor = primary_monitor.ok_or_else(|| {
            AutomationError::PlatformError("Could not find primary monitor".to_string())
        })?;

        let image = primary_monitor.capture_image().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to capture screen: {e}"))
        })?;

        Ok(ScreenshotResult {
            width: image.width(),
            height: image.height(),
            image_data: image.into_raw(),
        })
    }
}

pub struct WindowsUIElement {
    element: ThreadSafeWinUIElement,
}

impl Debug for WindowsUIElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsUIElement")
            .field("name", &self.element.0.get_name().unwrap_or_default())
            .finish()
    }
}

impl UIElementImpl for WindowsUIElement {
    fn role(&self) -> String {
        self.element
            .0
            .get_control_type()
            .map(|ct| format!("{ct:?}"))
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    fn name(&self) -> Option<String> {
        self.element.0.get_name().ok().filter(|name| !name.is_empty())
    }

    fn process_id(&self) -> Result<u32, AutomationError> {
        self.element
            .0
            .get_process_id()
            .map(|pid| pid as u32)
            .map_err(|e| AutomationError::ElementNotFound(e.to_string()))
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.element
            .0
            .is_enabled()
            .map_err(|e| AutomationError::ElementNotFound(e.to_string()))
    }

    fn is_visible(&self) -> Result<bool, AutomationError> {
        self.element
            .0
            .is_offscreen()
            .map(|is_offscreen| !is_offscreen)
            .map_err(|e| AutomationError::ElementNotFound(e.to_string()))
    }

    fn click(&self) -> Result<(), AutomationError> {
        self.element.0.try_focus();
        debug!("attempting to click element: {:?}", self.element.0);

        if self.element.0.click().is_ok() {
            return Ok(());
        }

        // Mouse click failed (e.g. no clickable point), fall back to the invoke pattern
        debug!("mouse click failed, falling back to invoke pattern");
        let invoke_pat = self
            .element
            .0
            .get_pattern::<patterns::UIInvokePattern>()
            .map_err(|e| {
                AutomationError::PlatformError(format!("Failed to get invoke pattern: {e}"))
            })?;
        invoke_pat
            .invoke()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to invoke: {e}")))
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(WindowsUIElement {
            element: self.element.clone(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn map_generic_role_to_win_roles(role: &str) -> ControlType {
    match role.to_lowercase().as_str() {
        "pane" | "app" | "application" => ControlType::Pane,
        "window" | "dialog" => ControlType::Window,
        "button" => ControlType::Button,
        "checkbox" => ControlType::CheckBox,
        "radiobutton" => ControlType::RadioButton,
        "text" => ControlType::Text,
        "edit" | "textfield" | "input" => ControlType::Edit,
        "combobox" => ControlType::ComboBox,
        "list" => ControlType::List,
        "listitem" => ControlType::ListItem,
        "progressbar" => ControlType::ProgressBar,
        "hyperlink" => ControlType::Hyperlink,
        "image" => ControlType::Image,
        "group" => ControlType::Group,
        "titlebar" | "title" => ControlType::TitleBar,
        _ => ControlType::Custom, // keep as it is for unknown roles
    }
}
