use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use webpilot_script::{RunResult, Runner, Script};

#[derive(Parser)]
#[command(name = "webpilot-replay")]
#[command(about = "Replay a compiled webpilot YAML script")]
#[command(version)]
struct Cli {
    /// YAML script written by `webpilot compile --format yaml`
    script: PathBuf,

    /// Force headless, whatever the script says
    #[arg(long)]
    headless: bool,

    /// Override the script's retry attempts
    #[arg(long)]
    attempts: Option<u32>,

    /// Parse and validate only
    #[arg(long)]
    check: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(quiet: bool, verbose: u8) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        _ => Level::DEBUG,
    }
}

fn report(script: &Script, result: &RunResult) {
    println!();
    if result.success {
        println!("✓ {} replayed", script.name);
    } else {
        println!("✗ {} failed", script.name);
        if let Some(ref action) = result.failed_action {
            println!("  At: {}", action);
        }
        if let Some(ref error) = result.error {
            println!("  Error: {}", error);
        }
        if let Some(ref path) = result.screenshot {
            println!("  Screenshot: {}", path);
        }
    }
    println!("  Actions: {}/{}", result.actions_executed, script.actions.len());
    println!("  Duration: {}ms", result.duration_ms);
    if result.retries > 0 {
        println!("  Retries: {}", result.retries);
    }
}

#[tokio::main]
async fn main() -> webpilot_script::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(log_level(cli.quiet, cli.verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut script = Script::load(&cli.script)?;
    if cli.check {
        println!("{}: {} actions from {}", script.name, script.actions.len(), script.target.url);
        return Ok(());
    }

    if cli.headless {
        script.browser.headless = true;
    }
    if let Some(attempts) = cli.attempts {
        let on_failure = script.on_failure.get_or_insert_with(Default::default);
        on_failure.retry.get_or_insert_with(Default::default).attempts = attempts.max(1);
    }

    let mut runner = Runner::new(&script.browser).await?;
    let result = runner.run(&script).await?;
    runner.close().await?;
    report(&script, &result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
