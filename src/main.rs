//! Risk register command line
//!
//! ```bash
//! risk-register init
//! risk-register overdue --tolerance-days 7
//! risk-register kpis --days 90
//! risk-register score --probability High --impact "Very high"
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use risk_register::database::Database;
use risk_register::engine::score_labels;
use risk_register::logging::init_logging;
use risk_register::{Config, RiskRegister};

#[derive(Parser)]
#[command(name = "risk-register")]
#[command(version)]
#[command(about = "Project risk register and action plan tracker", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "RISK_REGISTER_CONFIG", default_value = "risk-register.toml")]
    config: PathBuf,

    /// Database file, overriding the configuration
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed reference tables
    Init,
    /// List open action plans past their end date
    Overdue {
        /// Days of grace after the end date
        #[arg(long)]
        tolerance_days: Option<i64>,
    },
    /// Action plan dashboard
    Dashboard {
        /// How many responsible people to list
        #[arg(long)]
        top: Option<usize>,
    },
    /// Risk portfolio dashboard
    RiskDashboard,
    /// Probability/impact matrix of active risks
    Matrix,
    /// Key indicators for a trailing period
    Kpis {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Score a probability/impact pair
    Score {
        #[arg(long)]
        probability: String,
        #[arg(long)]
        impact: String,
    },
    /// Database health and record counts
    Health,
    /// Copy the database into the backup directory
    Backup {
        /// Destination file instead of a timestamped one
        #[arg(long)]
        to: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Score {
            probability,
            impact,
        } => {
            let level = score_labels(&probability, &impact, config.scoring.level_policy)?;
            print_json(&level)
        }
        Commands::Init => {
            let register = RiskRegister::open(&config)?;
            info!("Risk register ready at {}", config.database.path.display());
            print_json(&register.database.health_check())
        }
        Commands::Overdue { tolerance_days } => {
            let register = RiskRegister::open(&config)?;
            register.plans.refresh_overdue_flags()?;
            let tolerance = tolerance_days.unwrap_or(config.tracking.overdue_tolerance_days);
            print_json(&register.plans.list_overdue(tolerance)?)
        }
        Commands::Dashboard { top } => {
            let register = RiskRegister::open(&config)?;
            let top = top.unwrap_or(config.tracking.dashboard_top_n);
            print_json(&register.plans.dashboard(top)?)
        }
        Commands::RiskDashboard => {
            let register = RiskRegister::open(&config)?;
            print_json(&register.reports.risk_dashboard()?)
        }
        Commands::Matrix => {
            let register = RiskRegister::open(&config)?;
            print_json(&register.reports.risk_matrix()?)
        }
        Commands::Kpis { days } => {
            let register = RiskRegister::open(&config)?;
            print_json(&register.reports.kpis(days)?)
        }
        Commands::Health => {
            let register = RiskRegister::open(&config)?;
            let health = register.database.health_check();
            let stats = register.database.get_stats()?;
            print_json(&serde_json::json!({ "health": health, "stats": stats }))
        }
        Commands::Backup { to } => {
            let register = RiskRegister::open(&config)?;
            let dest = to.unwrap_or_else(|| Database::default_backup_path(&config.database.backup_dir));
            let written = register.database.backup_to(&dest)?;
            print_json(&written)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(Some(&cli.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }

    let _guard = init_logging(&config.logging);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
