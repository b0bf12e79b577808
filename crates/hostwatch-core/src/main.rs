//! Hostwatch CLI
//!
//! Command-line interface for the Hostwatch metrics agent.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use hostwatch::alerting::ConfigStore;
use hostwatch::config::{AgentConfig, LogFormat};
use hostwatch::models::metric::{CPU_USAGE_PERCENT, PROCESS_COUNT, RAM_LOAD_PERCENT, TOP_MEM_PROCESS_NAME};
use hostwatch::models::{ActionType, MetricSnapshot, Operator, ProcessInfo, RuleDefinition};
use hostwatch::Agent;

/// Hostwatch - host metrics agent with threshold rules
#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "HOSTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent in the foreground until Ctrl+C
    Run {
        /// Time between ticks (e.g. "500ms", "2s")
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// How often to print a status line
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        status_every: Duration,

        /// Reload when the rules file changes
        #[arg(long)]
        watch: bool,
    },

    /// Take one sample and print it
    Snapshot,

    /// Show the processes using the most memory
    Top {
        /// Number of processes to show
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Manage rule definitions
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },

    /// Terminate processes by pid or executable name
    Kill {
        /// Pid or exact executable name
        target: String,
    },

    /// Launch a shell command detached
    Script {
        /// Command line passed to the platform shell
        command: String,
    },

    /// Show a desktop notification
    Notify {
        /// Notification title
        title: String,

        /// Notification body
        message: String,
    },
}

#[derive(Subcommand)]
enum RulesCommands {
    /// List all rules
    List,

    /// Add a rule
    Add {
        /// Unique rule name
        name: String,

        /// Metric to watch (cpu_usage_percent, ram_load_percent, process_count, ...)
        #[arg(long)]
        metric: String,

        /// Comparison operator (>, >=, <, <=, ==, !=)
        #[arg(long, allow_hyphen_values = true)]
        oper: Operator,

        /// Threshold value
        #[arg(long, allow_hyphen_values = true)]
        threshold: f64,

        /// Action (log, notify, kill, script)
        #[arg(long)]
        action: ActionType,

        /// Action parameter: message, pid/name or command
        #[arg(long, default_value = "")]
        param: String,

        /// Store the rule disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Remove a rule
    Remove {
        /// Rule name
        name: String,
    },

    /// Enable a rule
    Enable {
        /// Rule name
        name: String,
    },

    /// Disable a rule
    Disable {
        /// Rule name
        name: String,
    },

    /// Replace all rules with the defaults
    Reset {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional and may set HOSTWATCH_CONFIG
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes the log file on exit
    let _guard = match init_tracing(&config, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Run {
            interval,
            status_every,
            watch,
        } => run_agent(config, interval, status_every, watch, cli.format).await,
        Commands::Snapshot => run_snapshot(config, cli.format).await,
        Commands::Top { count } => run_top(config, count, cli.format).await,
        Commands::Rules { command } => run_rules(&config, command, cli.format),
        Commands::Kill { target } => run_kill(&config, &target),
        Commands::Script { command } => run_script(&config, &command),
        Commands::Notify { title, message } => run_notify(&config, &title, &message),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &AgentConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_writer(io::stderr).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed(),
    });

    let mut guard = None;
    if let Some(path) = &config.logging.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;

        std::fs::create_dir_all(dir)?;
        let (writer, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry().with(layers).with(filter).try_init()?;
    Ok(guard)
}

async fn run_agent(
    mut config: AgentConfig,
    interval: Option<Duration>,
    status_every: Duration,
    watch: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if let Some(interval) = interval {
        config.agent.tick_interval = interval;
    }
    config.agent.watch_rules |= watch;
    config.validate()?;

    info!(
        interval = ?config.agent.tick_interval,
        rules = %config.agent.rules_path.display(),
        "Starting Hostwatch agent"
    );

    let running = Agent::from_config(&config).spawn()?;
    let handle = running.handle().clone();

    println!("Hostwatch running, rules from {}", config.agent.rules_path.display());
    println!("Press Ctrl+C to stop");

    let mut hangup = hangup_signal()?;
    let period = status_every.max(Duration::from_millis(100));
    let mut status = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            () = wait_for_hangup(&mut hangup) => {
                info!("SIGHUP received, reloading rules");
                handle.reload();
            }
            _ = status.tick() => {
                print_status(&handle.last_snapshot(), format)?;
            }
        }
    }

    tokio::task::spawn_blocking(move || running.stop()).await??;
    Ok(())
}

#[cfg(unix)]
type Hangup = tokio::signal::unix::Signal;

#[cfg(not(unix))]
type Hangup = ();

#[cfg(unix)]
fn hangup_signal() -> io::Result<Hangup> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
}

#[cfg(not(unix))]
fn hangup_signal() -> io::Result<Hangup> {
    Ok(())
}

#[cfg(unix)]
async fn wait_for_hangup(signal: &mut Hangup) {
    if signal.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
async fn wait_for_hangup(_signal: &mut Hangup) {
    std::future::pending::<()>().await;
}

fn print_status(snapshot: &MetricSnapshot, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(snapshot)?),
        OutputFormat::Text => {
            let show = |key: &str| snapshot.get(key).map_or_else(|| "-".to_string(), ToString::to_string);
            println!(
                "[{}] cpu {}% | ram {}% | procs {} | top {}",
                snapshot.captured_at.format("%H:%M:%S"),
                show(CPU_USAGE_PERCENT),
                show(RAM_LOAD_PERCENT),
                show(PROCESS_COUNT),
                show(TOP_MEM_PROCESS_NAME),
            );
        }
    }
    Ok(())
}

/// Initialize sources, wait one interval for CPU deltas, then sample
async fn sample_once(config: &AgentConfig) -> anyhow::Result<(MetricSnapshot, Vec<ProcessInfo>)> {
    let mut agent = Agent::from_config(config);
    let handle = agent.handle();
    let interval = config.agent.tick_interval;

    let snapshot = tokio::task::spawn_blocking(move || {
        // The first sample only sets the CPU baseline
        agent.initialize_sources();
        agent.sample();
        std::thread::sleep(interval);
        agent.sample()
    })
    .await?;

    Ok((snapshot, handle.top_processes()))
}

async fn run_snapshot(config: AgentConfig, format: OutputFormat) -> anyhow::Result<()> {
    let (snapshot, _) = sample_once(&config).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => {
            println!("Captured at {}", snapshot.captured_at.to_rfc3339());
            for (name, value) in snapshot.sorted() {
                println!("  {name:<24} {value}");
            }
        }
    }
    Ok(())
}

async fn run_top(mut config: AgentConfig, count: Option<usize>, format: OutputFormat) -> anyhow::Result<()> {
    if let Some(count) = count {
        config.agent.top_k = count.max(1);
    }
    let (_, top) = sample_once(&config).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&top)?),
        OutputFormat::Text => {
            println!("{:>8}  {:>12}  NAME", "PID", "MEMORY");
            for process in &top {
                println!(
                    "{:>8}  {:>12}  {}",
                    process.pid,
                    format_bytes(process.memory_bytes),
                    process.name
                );
            }
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}

fn run_rules(config: &AgentConfig, command: RulesCommands, format: OutputFormat) -> anyhow::Result<()> {
    let mut store = ConfigStore::load(&config.agent.rules_path);

    match command {
        RulesCommands::List => {
            print_rules(store.rules(), format)?;
            return Ok(());
        }
        RulesCommands::Add {
            name,
            metric,
            oper,
            threshold,
            action,
            param,
            disabled,
        } => {
            let rule = RuleDefinition::new(name, metric, oper, threshold, action, param).with_enabled(!disabled);
            let name = rule.name.clone();
            store.add(rule)?;
            println!("Added rule: {name}");
        }
        RulesCommands::Remove { name } => {
            store.remove(&name)?;
            println!("Removed rule: {name}");
        }
        RulesCommands::Enable { name } => {
            store.set_enabled(&name, true)?;
            println!("Enabled rule: {name}");
        }
        RulesCommands::Disable { name } => {
            store.set_enabled(&name, false)?;
            println!("Disabled rule: {name}");
        }
        RulesCommands::Reset { force } => {
            if !force {
                println!("WARNING: This will replace every rule with the defaults!");
                println!("Use --force to confirm.");
                return Ok(());
            }
            store.reset_to_defaults();
            println!("Rules reset to defaults");
        }
    }

    store.save()?;
    println!("Saved {} (send SIGHUP to a running agent to reload)", store.path().display());
    Ok(())
}

fn print_rules(rules: &[RuleDefinition], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rules)?),
        OutputFormat::Text => {
            if rules.is_empty() {
                println!("No rules defined");
            }
            for rule in rules {
                let mark = if rule.enabled { "on " } else { "off" };
                println!(
                    "[{mark}] {:<16} {} {} {} -> {} {}",
                    rule.name, rule.metric, rule.operator, rule.threshold, rule.action_type, rule.action_param
                );
            }
        }
    }
    Ok(())
}

fn run_kill(config: &AgentConfig, target: &str) -> anyhow::Result<()> {
    let handle = Agent::from_config(config).handle();
    let outcomes = handle.kill(target)?;

    for outcome in outcomes {
        match outcome.result {
            Ok(()) => println!("Terminated PID {}", outcome.pid),
            Err(e) => println!("PID {}: {e}", outcome.pid),
        }
    }
    Ok(())
}

fn run_script(config: &AgentConfig, command: &str) -> anyhow::Result<()> {
    let pid = Agent::from_config(config).handle().run_script(command)?;
    println!("Launched PID {pid}");
    Ok(())
}

fn run_notify(config: &AgentConfig, title: &str, message: &str) -> anyhow::Result<()> {
    Agent::from_config(config).handle().notify(title, message)?;
    println!("Notification sent");
    Ok(())
}
