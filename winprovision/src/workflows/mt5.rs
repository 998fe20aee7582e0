use super::{gate, Gate, Progress, WorkflowReport, WorkflowStatus};
use crate::config::Mt5Config;
use crate::{AutomationError, Desktop, Selector};
use std::path::PathBuf;
use tracing::{info, instrument};

/// How to start this process again, used for the elevation relaunch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Relative installer and config paths resolve against this
    pub working_dir: PathBuf,
}

impl SelfInvocation {
    /// The running executable, its arguments and working directory.
    pub fn current() -> Result<Self, AutomationError> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: std::env::args().skip(1).collect(),
            working_dir: std::env::current_dir()?,
        })
    }
}

/// Click through the MetaTrader 5 installer wizard.
///
/// Without administrator rights the process relaunches itself through the
/// elevation prompt (when `invocation` is given) and reports
/// [`WorkflowStatus::Relaunched`].
#[instrument(skip_all, fields(installer = %config.installer_path))]
pub async fn install(
    desktop: &Desktop,
    config: &Mt5Config,
    invocation: Option<&SelfInvocation>,
) -> Result<WorkflowReport, AutomationError> {
    let mut progress = Progress::new("install-mt5");
    let backend = desktop.backend();

    if config.require_elevation && !backend.is_elevated()? {
        let invocation = invocation.ok_or_else(|| {
            AutomationError::PermissionDenied(
                "the installer needs administrator rights".to_string(),
            )
        })?;
        backend.relaunch_elevated(
            &invocation.program,
            &invocation.args,
            &invocation.working_dir,
        )?;
        info!("Relaunched with elevation, exiting this instance");
        return Ok(progress.finish(WorkflowStatus::Relaunched));
    }
    let title = config.title_regex()?;

    info!("Step 1: Starting installer...");
    let pid = backend.launch_application(&config.installer_path)?;
    desktop
        .wait_for_process(pid, config.launch)
        .await?
        .into_result()?;
    progress.step("launch installer");
    info!("Step 2: Application started");

    desktop
        .wait_for_cpu_idle(pid, config.cpu_idle_threshold_percent, config.cpu_idle)
        .await?
        .into_result()?;
    progress.step("installer idle");

    let window = desktop
        .wait_for_window(&title, Some(pid), config.main_window)
        .await?
        .into_result()?;
    progress.step("main window");
    info!("Step 3: Main window found: {}", window.name_or_empty());

    tokio::time::sleep(config.settle_delay).await;

    info!("Step 4: Clicking through the wizard...");
    for button_title in &config.wizard_buttons {
        let button = desktop
            .locator(Selector::button(button_title))?
            .within(window.clone())
            .with_policy(config.button)
            .wait_ready()
            .await?;
        button.click()?;
        progress.step(format!("click {button_title}"));
    }

    info!("Step 5: Installation in progress, waiting for {}...", config.finish_button);
    let outcome = desktop
        .locator(Selector::button(&config.finish_button))?
        .within(window)
        .with_policy(config.finish)
        .wait_ready_outcome()
        .await?;
    let finish = match gate(outcome, config.finish_timeout_mode)? {
        Gate::Continue(button) => button,
        Gate::Stop(status) => return Ok(progress.finish(status)),
    };
    progress.step("installation");

    info!("{} button found, clicking...", config.finish_button);
    finish.click()?;
    progress.step(format!("click {}", config.finish_button));

    // let the installer wrap up before reporting success
    tokio::time::sleep(config.post_finish_delay).await;
    info!("Installation completed successfully");
    Ok(progress.finish(WorkflowStatus::Completed))
}
