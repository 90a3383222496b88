mod mcp;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use webpilot_agent::{CompileOptions, Format, Pilot, PilotConfig, RunStatus};
use webpilot_script::{load_history, Runner, Script};

#[derive(Parser)]
#[command(name = "webpilot")]
#[command(about = "Self-healing browser agent with replayable scripts")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $WEBPILOT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the browser tools over MCP (stdio)
    Mcp,

    /// Pursue a goal with the configured planner
    Run {
        /// What to accomplish
        goal: String,

        /// Start page
        #[arg(long)]
        url: Option<String>,

        /// Run in headless mode (overrides config)
        #[arg(long)]
        headless: bool,

        /// Write the committed history as JSON
        #[arg(long)]
        history: Option<PathBuf>,

        /// Write the compiled script
        #[arg(long)]
        script: Option<PathBuf>,

        /// Script format: playwright or yaml
        #[arg(long, default_value = "playwright")]
        format: String,
    },

    /// Compile a saved JSON history into a script
    Compile {
        /// History file written by `webpilot run --history`
        history: PathBuf,

        /// playwright or yaml
        #[arg(short, long, default_value = "playwright")]
        format: String,

        /// Script name
        #[arg(long)]
        name: Option<String>,

        /// Keep every command as recorded
        #[arg(long)]
        no_optimize: bool,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay a YAML script
    Replay {
        script: PathBuf,

        /// Run in headless mode (overrides script)
        #[arg(long)]
        headless: bool,
    },

    /// Validate a config file, or a YAML script with --script
    Check {
        path: PathBuf,

        #[arg(long)]
        script: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PilotConfig> {
    let mut config = match path {
        Some(p) => PilotConfig::load(p).with_context(|| format!("loading {}", p.display()))?,
        None => PilotConfig::from_env()?,
    };
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout belongs to the MCP transport
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    match cli.command {
        Command::Mcp => {
            let config = load_config(cli.config.as_ref())?;
            mcp::run_server(config).await
        }
        Command::Run {
            goal,
            url,
            headless,
            history,
            script,
            format,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if headless {
                config.browser.headless = true;
            }
            let format: Format = format.parse()?;
            run_goal(config, &goal, url.as_deref(), history, script, format).await
        }
        Command::Compile {
            history,
            format,
            name,
            no_optimize,
            output,
        } => {
            let commands = load_history(&history)?;
            let mut opts = CompileOptions {
                format: format.parse()?,
                optimize: !no_optimize,
                ..Default::default()
            };
            if let Some(name) = name {
                opts.name = name;
            }
            let source = webpilot_script::compile(&commands, &opts)?;
            match output {
                Some(path) => std::fs::write(&path, source)?,
                None => print!("{}", source),
            }
            Ok(())
        }
        Command::Replay { script, headless } => {
            let mut script = Script::load(&script)?;
            if headless {
                script.browser.headless = true;
            }
            println!("Replaying: {}", script.name);
            let mut runner = Runner::new(&script.browser).await?;
            let result = runner.run(&script).await?;
            runner.close().await?;

            if result.success {
                println!("✓ Success ({} actions, {}ms)", result.actions_executed, result.duration_ms);
                Ok(())
            } else {
                println!("✗ Failed");
                if let Some(ref action) = result.failed_action {
                    println!("  At: {}", action);
                }
                if let Some(ref error) = result.error {
                    println!("  Error: {}", error);
                }
                std::process::exit(1);
            }
        }
        Command::Check { path, script } => {
            if script {
                let script = Script::load(&path)?;
                println!("Script valid: {}", script.name);
                println!("  Target: {}", script.target.url);
                println!("  Actions: {}", script.actions.len());
            } else {
                let config = PilotConfig::load(&path)?;
                println!("Config valid: {}", path.display());
                println!("  Max steps: {}", config.agent.max_steps);
                println!("  Ambiguity band: {}", config.resolver.ambiguity_band);
                println!(
                    "  Planner: {}",
                    config.planner.endpoint.as_deref().unwrap_or("(not configured)")
                );
            }
            Ok(())
        }
    }
}

async fn run_goal(
    config: PilotConfig,
    goal: &str,
    url: Option<&str>,
    history_out: Option<PathBuf>,
    script_out: Option<PathBuf>,
    format: Format,
) -> anyhow::Result<()> {
    let headless = config.browser.headless;
    let mut pilot = Pilot::launch(config).await?;
    let planner = pilot.http_planner()?;
    if let Some(url) = url {
        let nav = pilot.goto(url).await?;
        if !nav.success {
            anyhow::bail!(nav.message);
        }
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current call");
            on_interrupt.cancel();
        }
    });

    let report = pilot.run_goal(goal, &planner, cancel).await?;
    for line in &report.narration {
        println!("{}", line);
    }
    println!();
    match report.status {
        RunStatus::Finished => println!("✓ Finished in {} steps", report.steps),
        RunStatus::MaxSteps => println!("✗ {}", report.message),
        RunStatus::Cancelled => println!("✗ Cancelled after {} steps", report.steps),
    }
    println!("  Commands recorded: {}", pilot.history().len());

    if let Some(path) = history_out {
        std::fs::write(&path, serde_json::to_string_pretty(pilot.history())?)?;
        println!("  History: {}", path.display());
    }
    if let Some(path) = script_out {
        let opts = CompileOptions {
            format,
            name: goal.to_string(),
            headless,
            ..Default::default()
        };
        std::fs::write(&path, pilot.compile(&opts)?)?;
        println!("  Script: {}", path.display());
    }

    pilot.close().await?;
    if report.status != RunStatus::Finished {
        std::process::exit(1);
    }
    Ok(())
}
