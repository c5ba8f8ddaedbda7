//! Halldyll infra CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll-infra command-line tool.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use halldyll_infra::cli::{Cli, Commands, LogFormat, OutputFormat, OutputFormatter};
use halldyll_infra::config::{load_dotenv, ConfigRenderer, DescriptorParser, Settings};
use halldyll_infra::error::Result;
use halldyll_infra::lifecycle::{InitRequest, LifecycleController};
use halldyll_infra::server;
use halldyll_infra::session::Operation;
use halldyll_infra::stream::{EventFeed, FeedEvent};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    // Load .env before parsing so clap sees its variables
    if let Err(e) = load_dotenv(None) {
        eprintln!("Warning: {e}");
    }

    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let mut settings = Settings::from_env()?;
    if let Some(workspace) = cli.workspace {
        settings.workspace_root = workspace;
    }
    if let Some(tool) = cli.tool {
        settings.tool = tool;
    }
    debug!("Settings: {settings:?}");

    match cli.command {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                settings.listen = listen;
            }
            server::serve(&settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Render { descriptor, out } => {
            cmd_render(&settings, &descriptor, out.as_deref(), &formatter).await
        }
        Commands::Validate { descriptor } => cmd_validate(&settings, &descriptor, &formatter),
        Commands::Init {
            session,
            region,
            descriptor,
        } => {
            let mut request = InitRequest::new(region);
            if let Some(path) = descriptor {
                request = request.with_descriptor(DescriptorParser::new().load_file(&path)?);
            }
            let controller = LifecycleController::from_settings(&settings);
            let feed = controller.init(&session.id, request).await?;
            finish_lifecycle(&controller, &session.id, feed, &formatter).await
        }
        Commands::Plan { session } => {
            cmd_lifecycle(&settings, Operation::Plan, &session.id, &formatter).await
        }
        Commands::Apply { session } => {
            cmd_lifecycle(&settings, Operation::Apply, &session.id, &formatter).await
        }
        Commands::Destroy { session } => {
            cmd_lifecycle(&settings, Operation::Destroy, &session.id, &formatter).await
        }
    }
}

/// Render a descriptor to standard output or a file.
async fn cmd_render(
    settings: &Settings,
    descriptor_path: &Path,
    out: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let descriptor = DescriptorParser::new().load_file(descriptor_path)?;
    let rendered = ConfigRenderer::with_validator(settings.validator()).render(&descriptor)?;

    if let Some(path) = out {
        tokio::fs::write(path, &rendered.text).await?;
        info!("Rendered {} to {}", descriptor_path.display(), path.display());
        eprintln!("{}", formatter.format_rendered(&rendered, &path.display().to_string()));
    } else {
        emit(&rendered.text)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Validate a descriptor and summarize it.
fn cmd_validate(
    settings: &Settings,
    descriptor_path: &Path,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let descriptor = DescriptorParser::new().load_file(descriptor_path)?;
    let result = settings.validator().validate(&descriptor)?;
    eprintln!("{}", formatter.format_validation(&descriptor, &result));
    Ok(ExitCode::SUCCESS)
}

/// Run plan, apply or destroy for one session.
async fn cmd_lifecycle(
    settings: &Settings,
    operation: Operation,
    session_id: &str,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let controller = LifecycleController::from_settings(settings);
    let feed = controller.run(operation, session_id).await?;
    finish_lifecycle(&controller, session_id, feed, formatter).await
}

/// Print the feed as it arrives, then the session status.
async fn finish_lifecycle(
    controller: &LifecycleController,
    session_id: &str,
    mut feed: EventFeed,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let json = formatter.format() == OutputFormat::Json;
    let mut succeeded = false;
    while let Some(event) = feed.recv().await {
        let line = formatter.format_event(&event);
        // JSON feeds go to standard output for scripting
        if json {
            emit(&format!("{line}\n"))?;
        } else {
            eprintln!("{line}");
        }
        if event.is_terminal() {
            succeeded = matches!(event, FeedEvent::Done { .. });
            break;
        }
    }

    let snapshot = controller.status(session_id)?;
    eprintln!("{}", formatter.format_status(&snapshot));

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Writes to standard output.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
