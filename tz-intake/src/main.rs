//! TicketZen intake client (tz-intake) - Main entry point
//!
//! Drives one intake session from the terminal: upload a receipt photo,
//! request analysis and follow the session until the server settles.
//! Rendered snapshots go to stdout, logs to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use tz_common::config::{self, ClientSettings, ConfigOverrides};
use tz_common::logging::init_tracing;
use tz_intake::models::{IntakeSnapshot, IntakeState, Rotation, SessionToken};
use tz_intake::presenter::{SnapshotSink, TextPresenter, TracingSink};
use tz_intake::{IntakeClient, IntakeWorkflow, UploadFile};

/// Command-line arguments for tz-intake
#[derive(Parser, Debug)]
#[command(name = "tz-intake")]
#[command(about = "TicketZen receipt intake client")]
#[command(version)]
struct Args {
    /// TicketZen server base URL
    #[arg(long, global = true, env = "TZ_SERVER_URL")]
    server: Option<String>,

    /// Status poll interval in milliseconds
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// HTTP request timeout in milliseconds
    #[arg(long, global = true)]
    request_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Config file (default: platform config dir, ticketzen/intake.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Report progress and result through the log instead of stdout
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct SessionArgs {
    /// Session token (the PIN shown with the QR code)
    #[arg(short, long, env = "TZ_INTAKE_TOKEN")]
    token: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a receipt photo, analyse it and wait for the result
    Submit {
        #[command(flatten)]
        session: SessionArgs,

        /// Receipt photo
        file: PathBuf,

        /// Rotate the photo before analysis
        #[arg(long, value_enum)]
        rotate: Option<RotateArg>,
    },
    /// Follow an existing session until it settles
    Watch {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RotateArg {
    Cw,
    Ccw,
}

impl From<RotateArg> for Rotation {
    fn from(arg: RotateArg) -> Self {
        match arg {
            RotateArg::Cw => Rotation::Clockwise,
            RotateArg::Ccw => Rotation::CounterClockwise,
        }
    }
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            server_url: self.server.clone(),
            poll_interval_ms: self.poll_interval_ms,
            request_timeout_ms: self.request_timeout_ms,
            log_level: self.log_level.clone(),
        }
    }
}

impl Command {
    fn token(&self) -> &str {
        match self {
            Command::Submit { session, .. } | Command::Watch { session } => &session.token,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let settings = ClientSettings::resolve(&args.overrides(), &loaded.config)
        .context("Invalid configuration")?;
    init_tracing(&settings.logging);
    loaded.log_source();

    info!(
        server = %settings.server_url,
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        "Starting TicketZen intake client"
    );

    let token = SessionToken::new(args.command.token())?;
    let client = IntakeClient::from_settings(&settings, token)
        .context("Failed to create intake client")?;
    let sink: Arc<dyn SnapshotSink> = if args.log_only {
        Arc::new(TracingSink)
    } else {
        Arc::new(TextPresenter::new(std::io::stdout()))
    };
    let mut workflow =
        IntakeWorkflow::with_interval(Arc::new(client), sink, settings.poll_interval);

    let outcome = tokio::select! {
        outcome = run(&mut workflow, &args.command) => Some(outcome),
        _ = signal::ctrl_c() => None,
    };
    workflow.shutdown().await;

    let snapshot = match outcome {
        Some(outcome) => outcome?,
        None => {
            warn!("Interrupted, session left unfinished");
            bail!("Interrupted before the session settled");
        }
    };

    match snapshot.state {
        IntakeState::Done => Ok(()),
        IntakeState::Failed => bail!(
            "Receipt analysis failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        state => bail!("Session stopped while {}", state),
    }
}

async fn run(workflow: &mut IntakeWorkflow, command: &Command) -> Result<IntakeSnapshot> {
    match command {
        Command::Submit { file, rotate, .. } => {
            let upload = UploadFile::from_path(file).await?;
            workflow.upload(&upload).await.context("Upload failed")?;
            if let Some(rotate) = rotate {
                workflow
                    .rotate((*rotate).into())
                    .await
                    .context("Rotation failed")?;
            }
            workflow
                .trigger_analysis()
                .await
                .context("Analysis request failed")?;
        }
        Command::Watch { .. } => workflow.resume(),
    }

    Ok(workflow.wait_for_terminal().await)
}
