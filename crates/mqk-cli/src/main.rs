use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mqk_audit::VerifyResult;
use mqk_config::UnusedKeyPolicy;
use std::path::PathBuf;

mod commands;

use commands::demo::{self, DemoArgs};

#[derive(Parser)]
#[command(name = "mqk")]
#[command(about = "MiniQuantDesk strategy host CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Report config keys that nothing in the host reads
    ConfigCheck {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Exit non-zero when any unused key is found
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Diagnostic audit log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Strategy host commands
    Strategy {
        #[command(subcommand)]
        cmd: StrategyCmd,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit JSONL file
    Verify {
        /// Path to audit.jsonl
        path: PathBuf,
    },

    /// Print each record of an audit JSONL file as one line
    Show {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum StrategyCmd {
    /// List the built-in strategies
    List,

    /// Run the built-in strategies against synthetic market data
    Demo {
        /// Layered config paths in merge order (optional; defaults apply)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Append every diagnostic to this audit log (overrides /audit/path)
        #[arg(long = "audit-log")]
        audit_log: Option<PathBuf>,

        /// Number of synthetic ticks to deliver
        #[arg(long, default_value_t = 30)]
        ticks: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev-time only; missing file is fine
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    install_panic_hook();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck {
            config_paths,
            strict,
        } => {
            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let loaded = commands::load_config(&config_paths)?;
            let report = commands::check_unused_keys(&loaded, policy)?;
            println!("config_hash={}", loaded.config_hash);
            for pointer in &report.unused_leaf_pointers {
                println!("unused_key={}", pointer);
            }
            println!("unused_keys={}", report.unused_leaf_pointers.len());
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => {
                let result = mqk_audit::verify_hash_chain(&path)
                    .with_context(|| format!("verify audit log {:?}", path))?;
                match result {
                    VerifyResult::Valid { lines } => {
                        println!("audit_valid=true");
                        println!("lines={}", lines);
                    }
                    VerifyResult::Broken { line, reason } => {
                        println!("audit_valid=false");
                        println!("line={}", line);
                        println!("reason={}", reason);
                        anyhow::bail!("audit hash chain broken at line {line}: {reason}");
                    }
                }
            }
            AuditCmd::Show { path } => {
                for rec in mqk_audit::read_records(&path)? {
                    let ev = &rec.event;
                    println!(
                        "seq={} ts={} severity={} source={} strategy_id={} hook={} message={:?}",
                        rec.seq,
                        ev.timestamp().to_rfc3339(),
                        ev.severity(),
                        ev.source(),
                        ev.strategy_id(),
                        ev.hook_name(),
                        ev.message()
                    );
                }
            }
        },

        Commands::Strategy { cmd } => match cmd {
            StrategyCmd::List => {
                let registry = demo::builtin_registry()?;
                for meta in registry.list() {
                    println!(
                        "strategy={} version={} description={:?}",
                        meta.name, meta.version, meta.description
                    );
                }
            }
            StrategyCmd::Demo {
                config_paths,
                audit_log,
                ticks,
            } => {
                let summary = demo::run_demo(DemoArgs {
                    config_paths,
                    audit_log,
                    ticks,
                })
                .await?;

                println!("run_id={}", summary.run_id);
                println!("config_hash={}", summary.config_hash);
                if let Some(path) = &summary.audit_log {
                    println!("audit_log={}", path.display());
                }
                for s in &summary.strategies {
                    println!(
                        "strategy_id={} lifecycle={} invocations={} captures={} consecutive_failures={}",
                        s.strategy_id, s.lifecycle, s.invocations, s.captures, s.consecutive_failures
                    );
                }
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Strategy panics are captured and reported as diagnostic events; keep the
/// default backtrace printer off stderr.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let thread = std::thread::current();
        tracing::debug!(
            thread = thread.name().unwrap_or("<unnamed>"),
            panic = %info,
            "panic caught"
        );
    }));
}
