use super::{gate, Gate, Progress, WorkflowReport, WorkflowStatus};
use crate::config::{FirstBootConfig, InstallMethod, PackageSpec};
use crate::platforms::AutomationBackend;
use crate::{vision, AutomationError, CommandRunner, Desktop, TemplateMatch};
use std::time::Duration;
use tracing::{error, info, instrument};

/// Synthetic keyboard input with a pause after every action
struct KeyboardSession<'a> {
    backend: &'a dyn AutomationBackend,
    pause: Duration,
}

impl KeyboardSession<'_> {
    async fn keys(&self, keys: &str) -> Result<(), AutomationError> {
        self.backend.send_keys(keys)?;
        tokio::time::sleep(self.pause).await;
        Ok(())
    }

    async fn text(&self, text: &str) -> Result<(), AutomationError> {
        self.backend.type_text(text)?;
        tokio::time::sleep(self.pause).await;
        Ok(())
    }
}

/// Wait for the desktop after a fresh boot, install the configured packages and
/// open Windows Settings.
#[instrument(skip_all)]
pub async fn run(
    desktop: &Desktop,
    runner: &dyn CommandRunner,
    config: &FirstBootConfig,
    skip_boot_delay: bool,
) -> Result<WorkflowReport, AutomationError> {
    let mut progress = Progress::new("first-boot");
    info!("Starting Windows automation");

    if !skip_boot_delay {
        info!("Waiting {:?} for Windows to boot", config.boot_delay);
        tokio::time::sleep(config.boot_delay).await;
        progress.step("boot delay");
    }

    if let Gate::Stop(status) = wait_for_desktop_ready(desktop, config).await? {
        return Ok(progress.finish(status));
    }
    progress.step("desktop ready");

    install_software(desktop, runner, config, &mut progress)
        .await
        .inspect_err(|e| error!("Error during software installation: {}", e))?;

    configure_settings(desktop, config)
        .await
        .inspect_err(|e| error!("Error during settings configuration: {}", e))?;
    progress.step("settings");

    info!("Automation completed successfully");
    Ok(progress.finish(WorkflowStatus::Completed))
}

/// Wait until the taskbar Start button is on screen.
///
/// A missing template image fails immediately rather than after the timeout.
pub(crate) async fn wait_for_desktop_ready(
    desktop: &Desktop,
    config: &FirstBootConfig,
) -> Result<Gate<TemplateMatch>, AutomationError> {
    let template = vision::load_template(&config.start_button_image)?;
    let outcome = desktop
        .wait_for_image(
            "Start button",
            &template,
            config.start_button_confidence,
            config.ready,
        )
        .await?;
    let gate = gate(outcome, config.ready_timeout_mode)?;
    if let Gate::Continue(found) = &gate {
        info!("Windows is ready (Start button at {:?})", found.center());
    }
    Ok(gate)
}

async fn install_software(
    desktop: &Desktop,
    runner: &dyn CommandRunner,
    config: &FirstBootConfig,
    progress: &mut Progress,
) -> Result<(), AutomationError> {
    for package in &config.packages {
        match config.install_method {
            InstallMethod::Command => {
                runner
                    .run(&package.command)
                    .await?
                    .ensure_success(&package.name)?;
            }
            InstallMethod::RunDialog => type_into_run_dialog(desktop, config, package).await?,
        }
        info!("{} installation completed", package.name);
        progress.step(format!("install {}", package.name));
    }
    Ok(())
}

async fn type_into_run_dialog(
    desktop: &Desktop,
    config: &FirstBootConfig,
    package: &PackageSpec,
) -> Result<(), AutomationError> {
    let keyboard = KeyboardSession {
        backend: desktop.backend().as_ref(),
        pause: config.action_pause,
    };
    keyboard.keys(&config.run_dialog_keys).await?;
    keyboard.text("powershell").await?;
    keyboard.keys("{enter}").await?;
    tokio::time::sleep(config.window_open_delay).await;

    keyboard.text(&single_line(&package.command)).await?;
    keyboard.keys("{enter}").await
}

async fn configure_settings(
    desktop: &Desktop,
    config: &FirstBootConfig,
) -> Result<(), AutomationError> {
    let keyboard = KeyboardSession {
        backend: desktop.backend().as_ref(),
        pause: config.action_pause,
    };
    keyboard.keys(&config.settings_keys).await?;
    tokio::time::sleep(config.window_open_delay).await;

    keyboard.text(&config.settings_query).await?;
    keyboard.keys("{enter}").await?;
    info!("Settings configured successfully");
    Ok(())
}

// A typed newline would submit a half-written script to the console
fn single_line(script: &str) -> String {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::single_line;

    #[test]
    fn test_single_line_joins_script_lines() {
        let script = "\n  $Path = $env:TEMP;\n\n  Remove-Item $Path\\x;\n";
        assert_eq!(single_line(script), "$Path = $env:TEMP; Remove-Item $Path\\x;");
    }
}
