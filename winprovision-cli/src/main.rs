//! winprovision CLI
//!
//! Runs the provisioning workflows and one-off readiness waits from the command line.
//!
//! Usage:
//!   winprovision install-mt5 --installer C:\Downloads\mt5setup.exe
//!   winprovision first-boot --skip-boot-delay
//!   winprovision wait-window ".*Meta.*" --timeout 15
//!   winprovision wait-element "button|Finish" --window ".*Meta.*" --timeout 900 --poll 5
//!   winprovision wait-image start_button.png --confidence 0.8
//!   winprovision show-config

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use winprovision::config::ProvisionConfig;
use winprovision::workflows::{first_boot, mt5};
use winprovision::{
    vision, Desktop, InstallMethod, PowerShellRunner, Selector, TimeoutMode, WaitOutcome,
    WaitPolicy,
};

mod logging;
mod output;

use output::{print_wait, print_workflow, workflow_exit_code, WaitReport};

#[derive(Parser, Debug)]
#[command(name = "winprovision")]
#[command(version, about = "Unattended Windows provisioning with bounded readiness waits")]
struct Cli {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(long, short, global = true, env = "WINPROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "WINPROVISION_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install MetaTrader 5 by clicking through its setup wizard
    InstallMt5(InstallMt5Args),
    /// Wait for a freshly booted desktop, install packages and open Settings
    FirstBoot(FirstBootArgs),
    /// Wait for a top-level window whose title matches a regex
    WaitWindow(WaitWindowArgs),
    /// Wait for a control to become visible and enabled
    WaitElement(WaitElementArgs),
    /// Wait for a reference image to appear on screen
    WaitImage(WaitImageArgs),
    /// Print the effective configuration as YAML
    ShowConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lower")]
enum TimeoutModeArg {
    Hard,
    Soft,
}

impl From<TimeoutModeArg> for TimeoutMode {
    fn from(mode: TimeoutModeArg) -> Self {
        match mode {
            TimeoutModeArg::Hard => TimeoutMode::Hard,
            TimeoutModeArg::Soft => TimeoutMode::Soft,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
enum InstallMethodArg {
    Command,
    RunDialog,
}

impl From<InstallMethodArg> for InstallMethod {
    fn from(method: InstallMethodArg) -> Self {
        match method {
            InstallMethodArg::Command => InstallMethod::Command,
            InstallMethodArg::RunDialog => InstallMethod::RunDialog,
        }
    }
}

/// Timeout and poll interval, in seconds
#[derive(Args, Debug, Clone, Copy)]
struct PolicyArgs {
    /// Give up after this many seconds
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Seconds between checks
    #[arg(long, default_value_t = 1.0)]
    poll: f64,
}

impl PolicyArgs {
    fn policy(&self) -> Result<WaitPolicy> {
        Ok(WaitPolicy::from_secs_f64(self.timeout, self.poll)?)
    }
}

#[derive(Args, Debug)]
struct InstallMt5Args {
    /// Path to mt5setup.exe
    #[arg(long)]
    installer: Option<String>,

    /// Seconds to wait for the Finish button
    #[arg(long)]
    finish_timeout: Option<f64>,

    /// Seconds between Finish button checks
    #[arg(long)]
    finish_poll: Option<f64>,

    /// What to do when the Finish button never shows up
    #[arg(long, value_enum)]
    timeout_mode: Option<TimeoutModeArg>,

    /// Do not relaunch with administrator rights
    #[arg(long)]
    no_elevate: bool,
}

#[derive(Args, Debug)]
struct FirstBootArgs {
    /// Skip the initial boot grace period
    #[arg(long)]
    skip_boot_delay: bool,

    /// Seconds to wait for the desktop to become ready
    #[arg(long)]
    ready_timeout: Option<f64>,

    /// Seconds between desktop readiness checks
    #[arg(long)]
    ready_poll: Option<f64>,

    /// What to do when the desktop never becomes ready
    #[arg(long, value_enum)]
    timeout_mode: Option<TimeoutModeArg>,

    /// How packages get installed
    #[arg(long, value_enum)]
    install_method: Option<InstallMethodArg>,

    /// Reference image of the taskbar Start button
    #[arg(long)]
    start_button: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WaitWindowArgs {
    /// Regex matched against window titles
    pattern: String,

    /// Only consider windows of this process
    #[arg(long)]
    pid: Option<u32>,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args, Debug)]
struct WaitElementArgs {
    /// Selector such as "button|Finish" or "name:Next"
    selector: String,

    /// Search inside the first window whose title matches this regex.
    /// The window wait and the element wait share one timeout.
    #[arg(long)]
    window: Option<String>,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[derive(Args, Debug)]
struct WaitImageArgs {
    /// Reference image to look for
    image: PathBuf,

    /// Minimum similarity, above 0 and at most 1
    #[arg(long, default_value_t = 0.8, value_parser = parse_confidence)]
    confidence: f32,

    #[command(flatten)]
    policy: PolicyArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.log_dir.as_deref())?;

    let config = load_config(cli.config.as_deref())?;
    run(cli.command, config, cli.json).await.inspect_err(|e| {
        error!("{:#}", e);
    })
}

fn load_config(path: Option<&Path>) -> Result<ProvisionConfig> {
    match path {
        Some(path) => ProvisionConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(ProvisionConfig::default()),
    }
}

async fn run(command: Commands, mut config: ProvisionConfig, json: bool) -> Result<ExitCode> {
    match command {
        Commands::InstallMt5(args) => {
            apply_mt5_overrides(&mut config, &args)?;
            config.validate()?;
            let desktop = Desktop::new()?;
            let invocation = mt5::SelfInvocation::current()?;
            let report = mt5::install(&desktop, &config.mt5, Some(&invocation)).await?;
            print_workflow(&report, json)?;
            Ok(workflow_exit_code(&report))
        }
        Commands::FirstBoot(args) => {
            apply_first_boot_overrides(&mut config, &args)?;
            config.validate()?;
            let desktop = Desktop::new()?;
            let runner = PowerShellRunner::default();
            let report =
                first_boot::run(&desktop, &runner, &config.first_boot, args.skip_boot_delay)
                    .await?;
            print_workflow(&report, json)?;
            Ok(workflow_exit_code(&report))
        }
        Commands::WaitWindow(args) => {
            let title = Regex::new(&args.pattern)
                .with_context(|| format!("Invalid title pattern '{}'", args.pattern))?;
            let desktop = Desktop::new()?;
            let outcome = desktop
                .wait_for_window(&title, args.pid, args.policy.policy()?)
                .await?;
            let report = WaitReport::from_outcome(
                format!("window matching '{}'", args.pattern),
                outcome,
                |window| serde_json::to_value(window.attributes()).unwrap_or_default(),
            );
            print_wait(&report, json)?;
            Ok(report.exit_code())
        }
        Commands::WaitElement(args) => {
            let desktop = Desktop::new()?;
            let mut policy = args.policy.policy()?;
            let mut locator = desktop.locator(Selector::from(args.selector.as_str()))?;
            if let Some(pattern) = &args.window {
                let title = Regex::new(pattern)
                    .with_context(|| format!("Invalid title pattern '{pattern}'"))?;
                let window = match desktop.wait_for_window(&title, None, policy).await? {
                    WaitOutcome::Ready { value, elapsed, .. } => {
                        policy = remaining(policy, elapsed);
                        value
                    }
                    timed_out => {
                        let report = WaitReport::from_outcome(
                            format!("window matching '{pattern}'"),
                            timed_out,
                            |_| serde_json::Value::Null,
                        );
                        print_wait(&report, json)?;
                        return Ok(report.exit_code());
                    }
                };
                info!("Searching inside window '{}'", window.name_or_empty());
                locator = locator.within(window);
            }
            let outcome = locator.with_policy(policy).wait_ready_outcome().await?;
            let report = WaitReport::from_outcome(
                format!("{} to be visible and enabled", args.selector),
                outcome,
                |element| serde_json::to_value(element.attributes()).unwrap_or_default(),
            );
            print_wait(&report, json)?;
            Ok(report.exit_code())
        }
        Commands::WaitImage(args) => {
            let template = vision::load_template(&args.image)?;
            let desktop = Desktop::new()?;
            let label = args.image.display().to_string();
            let outcome = desktop
                .wait_for_image(&label, &template, args.confidence, args.policy.policy()?)
                .await?;
            let report =
                WaitReport::from_outcome(format!("{label} to appear on screen"), outcome, |found| {
                    let (x, y) = found.center();
                    serde_json::json!({ "x": x, "y": y, "confidence": found.confidence })
                });
            print_wait(&report, json)?;
            Ok(report.exit_code())
        }
        Commands::ShowConfig => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_yaml()?);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_mt5_overrides(config: &mut ProvisionConfig, args: &InstallMt5Args) -> Result<()> {
    let mt5 = &mut config.mt5;
    if let Some(installer) = &args.installer {
        mt5.installer_path = installer.clone();
    }
    mt5.finish = override_policy(mt5.finish, args.finish_timeout, args.finish_poll)?;
    if let Some(mode) = args.timeout_mode {
        mt5.finish_timeout_mode = mode.into();
    }
    if args.no_elevate {
        mt5.require_elevation = false;
    }
    Ok(())
}

fn apply_first_boot_overrides(config: &mut ProvisionConfig, args: &FirstBootArgs) -> Result<()> {
    let first_boot = &mut config.first_boot;
    first_boot.ready = override_policy(first_boot.ready, args.ready_timeout, args.ready_poll)?;
    if let Some(mode) = args.timeout_mode {
        first_boot.ready_timeout_mode = mode.into();
    }
    if let Some(method) = args.install_method {
        first_boot.install_method = method.into();
    }
    if let Some(image) = &args.start_button {
        first_boot.start_button_image = image.clone();
    }
    Ok(())
}

fn override_policy(
    policy: WaitPolicy,
    timeout: Option<f64>,
    poll: Option<f64>,
) -> Result<WaitPolicy> {
    if timeout.is_none() && poll.is_none() {
        return Ok(policy);
    }
    Ok(WaitPolicy::from_secs_f64(
        timeout.unwrap_or(policy.timeout().as_secs_f64()),
        poll.unwrap_or(policy.poll_interval().as_secs_f64()),
    )?)
}

/// What is left of `policy` once `spent` went into an earlier wait.
fn remaining(policy: WaitPolicy, spent: Duration) -> WaitPolicy {
    policy.with_timeout(policy.timeout().saturating_sub(spent))
}

fn parse_confidence(value: &str) -> Result<f32, String> {
    let confidence: f32 = value.parse().map_err(|e| format!("{e}"))?;
    vision::check_confidence(confidence).map_err(|e| e.to_string())?;
    Ok(confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_install_overrides() {
        let cli = Cli::try_parse_from([
            "winprovision",
            "--json",
            "install-mt5",
            "--installer",
            "D:\\mt5setup.exe",
            "--finish-timeout",
            "60",
            "--timeout-mode",
            "hard",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::InstallMt5(args) = cli.command else {
            panic!("expected install-mt5");
        };

        let mut config = ProvisionConfig::default();
        apply_mt5_overrides(&mut config, &args).unwrap();

        assert_eq!(config.mt5.installer_path, "D:\\mt5setup.exe");
        assert_eq!(config.mt5.finish.timeout(), Duration::from_secs(60));
        assert_eq!(config.mt5.finish.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.mt5.finish_timeout_mode, TimeoutMode::Hard);
        assert!(config.mt5.require_elevation);
    }

    #[test]
    fn test_first_boot_overrides() {
        let cli = Cli::try_parse_from([
            "winprovision",
            "first-boot",
            "--skip-boot-delay",
            "--ready-poll",
            "2",
            "--install-method",
            "run-dialog",
        ])
        .unwrap();
        let Commands::FirstBoot(args) = cli.command else {
            panic!("expected first-boot");
        };
        assert!(args.skip_boot_delay);

        let mut config = ProvisionConfig::default();
        apply_first_boot_overrides(&mut config, &args).unwrap();

        assert_eq!(config.first_boot.ready.timeout(), Duration::from_secs(300));
        assert_eq!(config.first_boot.ready.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.first_boot.install_method, InstallMethod::RunDialog);
    }

    #[test]
    fn test_zero_poll_override_is_rejected() {
        assert!(override_policy(WaitPolicy::from_millis(1_000, 100), None, Some(0.0)).is_err());
    }

    #[test]
    fn test_wait_commands_use_default_policy() {
        let cli = Cli::try_parse_from(["winprovision", "wait-window", ".*Meta.*"]).unwrap();
        let Commands::WaitWindow(args) = cli.command else {
            panic!("expected wait-window");
        };
        let policy = args.policy.policy().unwrap();
        assert_eq!(policy.timeout(), Duration::from_secs(30));
        assert_eq!(policy.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("provision.yaml");
        std::fs::write(&path, "mt5:\n  installer_path: custom.exe\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.mt5.installer_path, "custom.exe");
        assert!(load_config(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_window_wait_eats_into_element_budget() {
        let policy = WaitPolicy::from_millis(30_000, 1_000);

        let left = remaining(policy, Duration::from_secs(12));
        assert_eq!(left.timeout(), Duration::from_secs(18));
        assert_eq!(left.poll_interval(), Duration::from_secs(1));

        assert_eq!(
            remaining(policy, Duration::from_secs(45)).timeout(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_confidence_outside_unit_range_is_rejected() {
        let parse = |confidence: &str| {
            let flag = format!("--confidence={confidence}");
            Cli::try_parse_from(["winprovision", "wait-image", "a.png", flag.as_str()])
        };
        assert!(parse("-1").is_err());
        assert!(parse("1.5").is_err());
        assert!(parse("NaN").is_err());

        let Commands::WaitImage(args) = parse("0.9").unwrap().command else {
            panic!("expected wait-image");
        };
        assert_eq!(args.confidence, 0.9);
    }
}
