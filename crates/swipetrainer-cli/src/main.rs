#[cfg_attr(not(feature = "browser"), allow(dead_code))]
mod prompt;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use swipetrainer_core::args::CommonArgs;
use swipetrainer_core::config::Config;
use swipetrainer_core::logging::{self, LogConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Open the app and record every swipe, made in the browser or typed here
    Training,
    /// Swipe automatically (not implemented)
    Auto,
}

#[derive(Debug, Parser)]
#[command(
    name = "swipetrainer",
    version,
    about = "Capture swipes on the web client and record each profile with one photo"
)]
struct Cli {
    /// Running mode
    #[arg(value_enum)]
    mode: Mode,
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(if cli.common.debug {
        LogConfig::debug()
    } else {
        LogConfig::from_env()
    });

    let mut config = Config::load(cli.common.config.clone())?;
    cli.common.apply_overrides(&mut config);

    match cli.mode {
        Mode::Auto => bail!("auto mode is not implemented"),
        Mode::Training => training::run(config).await,
    }
}

#[cfg(feature = "browser")]
mod training {
    use anyhow::{Context, Result, bail};
    use colored::Colorize;
    use swipetrainer_core::browser::{BrowserOptions, CdpBrowser, CdpPage};
    use swipetrainer_core::config::Config;
    use swipetrainer_core::ledger::ProfileLedger;
    use swipetrainer_core::session::SessionManager;
    use swipetrainer_core::training::{TrainingController, run_training};
    use swipetrainer_core::SwipeCorrelator;
    use tracing::{info, warn};

    use crate::prompt::TerminalInput;

    pub async fn run(config: Config) -> Result<()> {
        let auth_type = config
            .auth_type
            .clone()
            .context("a login method is required: pass --auth_type or set auth_type in config")?;

        let ledger = ProfileLedger::open(&config.out_dir, config.ledger_options())?;
        let correlator = SwipeCorrelator::new(&config.api_host)?;

        let browser = CdpBrowser::launch(&BrowserOptions {
            headless: config.headless,
            user_data_dir: config.user_data_dir.clone(),
            login_scripts_dir: config.login_scripts_dir.clone(),
        })
        .await?;
        let page = browser.page();
        let requests = page.subscribe(&correlator).await?;

        let mut session = SessionManager::new(page.clone(), config.session_options());
        login(&mut session, &config, &auth_type).await?;

        let mut controller = TrainingController::new(
            page.clone(),
            page,
            correlator,
            ledger,
            config.training_options(),
        );
        let summary = run_training(&mut controller, &mut TerminalInput::new()).await?;

        println!(
            "{} {} confirmed, {} recorded, {} skipped, {} unconfirmed",
            "done:".green().bold(),
            summary.confirmed,
            summary.recorded,
            summary.skipped,
            summary.unconfirmed
        );

        requests.abort();
        browser.close().await
    }

    async fn login(session: &mut SessionManager<CdpPage>, config: &Config, auth_type: &str) -> Result<()> {
        let attempts = config.login_attempts.max(1);
        for attempt in 1..=attempts {
            match session.login(&config.auth_file, auth_type).await {
                Ok(()) => {
                    info!("logged in");
                    return Ok(());
                }
                Err(err) if err.is_config_error() => return Err(err.into()),
                Err(err) => warn!(attempt, error = %err, "login attempt failed"),
            }
        }
        bail!("still not logged in after {attempts} attempts")
    }
}

#[cfg(not(feature = "browser"))]
mod training {
    use anyhow::{Result, bail};
    use swipetrainer_core::config::Config;

    pub async fn run(_config: Config) -> Result<()> {
        bail!("training mode requires the 'browser' feature. Build with: cargo build --features browser")
    }
}
