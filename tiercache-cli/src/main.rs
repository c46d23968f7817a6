use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tiercache::{CacheConfig, CacheOrchestrator};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tiercache-cli")]
#[command(about = "tiercache CLI - inspect and drive a multi-tier cache", long_about = None)]
struct Args {
    /// YAML configuration file (defaults apply when omitted)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Command to execute (if not in interactive mode)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

struct CacheShell {
    cache: CacheOrchestrator,
}

impl CacheShell {
    async fn execute_command(&self, command: &str, args: &[String]) -> Result<String> {
        let start = Instant::now();

        let response = match command.to_uppercase().as_str() {
            "GET" => self.cmd_get(args).await?,
            "SET" => self.cmd_set(args).await?,
            "DEL" | "DELETE" => self.cmd_del(args).await?,
            "CLEAR" | "FLUSHALL" => self.cmd_clear().await,
            "INVALIDATE" => self.cmd_invalidate(args).await?,
            "STATS" | "INFO" => self.cmd_stats()?,
            "ADVISE" => self.cmd_advise(),
            "LAYERS" => self.cmd_layers(),
            "METRICS" => cmd_metrics()?,
            "HELP" => help_text(),
            _ => return Err(anyhow::anyhow!("Unknown command: {}", command)),
        };

        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            response,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    async fn cmd_get(&self, args: &[String]) -> Result<String> {
        let key = args
            .first()
            .ok_or_else(|| anyhow::anyhow!("Usage: GET key"))?;

        match self.cache.get::<String>(key).await? {
            Some(value) => Ok(format!("\"{}\"", value)),
            None => Ok("(nil)".dimmed().to_string()),
        }
    }

    async fn cmd_set(&self, args: &[String]) -> Result<String> {
        if args.len() < 2 {
            return Err(anyhow::anyhow!("Usage: SET key value [ttl]"));
        }
        let ttl = parse_ttl(args.get(2))?;

        if self.cache.set(&args[0], &args[1], ttl).await? {
            Ok("OK".green().to_string())
        } else {
            Ok("(not stored: no layer accepted the write)".yellow().to_string())
        }
    }

    async fn cmd_del(&self, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Err(anyhow::anyhow!("Usage: DEL key [key ...]"));
        }

        let mut deleted = 0;
        for key in args {
            if self.cache.delete(key).await {
                deleted += 1;
            }
        }
        Ok(format!("(integer) {}", deleted))
    }

    async fn cmd_clear(&self) -> String {
        if self.cache.clear().await {
            "OK".green().to_string()
        } else {
            "(no layer flushed)".yellow().to_string()
        }
    }

    async fn cmd_invalidate(&self, args: &[String]) -> Result<String> {
        let pattern = args
            .first()
            .ok_or_else(|| anyhow::anyhow!("Usage: INVALIDATE pattern"))?;

        let removed = self.cache.invalidate_pattern(pattern).await?;
        Ok(format!("(integer) {}", removed))
    }

    fn cmd_stats(&self) -> Result<String> {
        let snapshot = self.cache.get_stats();
        serde_json::to_string_pretty(&snapshot).context("Failed to render stats")
    }

    fn cmd_advise(&self) -> String {
        let recommendations = self.cache.advise();
        if recommendations.is_empty() {
            return "(no recommendations)".dimmed().to_string();
        }

        recommendations
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}) {}", i + 1, r.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cmd_layers(&self) -> String {
        self.cache
            .layers()
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let state = if layer.enabled {
                    "enabled".green()
                } else {
                    "disabled".red()
                };
                let patterns = if layer.supports_pattern_delete {
                    "pattern-delete"
                } else {
                    "no pattern-delete"
                };
                format!(
                    "{}) {} ({}) {} {}",
                    i + 1,
                    layer.kind,
                    layer.name,
                    state,
                    patterns.dimmed()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn cmd_metrics() -> Result<String> {
    tiercache::metrics::encode_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
}

/// Optional TTL argument in whole seconds
fn parse_ttl(arg: Option<&String>) -> Result<Option<Duration>> {
    match arg {
        None => Ok(None),
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("Invalid TTL '{}': expected seconds", raw))?;
            Ok(Some(Duration::from_secs(secs)))
        }
    }
}

fn help_text() -> String {
    format!(
        r#"{}

{}
  GET key                    Get the string value of key
  SET key value [ttl]        Store value in every layer, TTL in seconds
  DEL key [key ...]          Delete keys from every layer

{}
  INVALIDATE pattern         Remove keys matching a glob (* ? \)
  CLEAR                      Flush every layer

{}
  STATS                      Hit rate, counters, latency, top keys
  ADVISE                     Tuning recommendations
  LAYERS                     Configured layers and their state
  METRICS                    Prometheus metrics
  HELP                       Show this help message
  QUIT                       Exit the CLI
"#,
        "tiercache CLI - Available Commands".bold().cyan(),
        "Basic Commands:".bold(),
        "Invalidation:".bold(),
        "Monitoring:".bold(),
    )
}

fn init_tracing(config: &CacheConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false);

    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CacheConfig::default(),
    };
    init_tracing(&config);

    let cache = CacheOrchestrator::connect(config)
        .await
        .context("Failed to start cache")?;
    let shell = CacheShell { cache };

    // Check if running in command mode or interactive mode
    if !args.command.is_empty() {
        let cmd = &args.command[0];
        let cmd_args: Vec<String> = args.command[1..].to_vec();

        match shell.execute_command(cmd, &cmd_args).await {
            Ok(output) => {
                println!("{}", output);
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
    } else {
        run_interactive(shell).await
    }
}

async fn run_interactive(shell: CacheShell) -> Result<()> {
    println!(
        "{}",
        format!("tiercache CLI v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    println!("{}\n", shell.cmd_layers());
    println!("Type {} for available commands\n", "HELP".bold());

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(&format!("{}> ", "tiercache".green()));

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                rl.add_history_entry(&line)?;

                let parts: Vec<String> = line.split_whitespace().map(String::from).collect();
                let cmd = &parts[0];
                let args = &parts[1..];

                if cmd.eq_ignore_ascii_case("QUIT") || cmd.eq_ignore_ascii_case("EXIT") {
                    println!("Goodbye!");
                    break;
                }

                match shell.execute_command(cmd, args).await {
                    Ok(output) => println!("{}", output),
                    Err(e) => eprintln!("{}", format!("Error: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!(error = ?err, "Readline error");
                break;
            }
        }
    }

    Ok(())
}
