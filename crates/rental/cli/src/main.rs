use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use rental_cli::{run_scenario, Scenario};
use rental_core::{
    ListingAuthority, OverpaymentPolicy, PenaltySchedule, RentalConfig, FORFEIT_AFTER_MINUTES,
    GRACE_MINUTES,
};
use rental_types::Amount;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthorityMode {
    Open,
    AdminOnly,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverpaymentMode {
    Reject,
    Refund,
}

#[derive(Debug, Parser)]
#[command(name = "rentalctl", version, about = "Book rental escrow operator tool")]
struct Cli {
    /// Identity of the deployment administrator.
    #[arg(long, default_value = "owner", env = "RENTAL_ADMINISTRATOR")]
    administrator: String,
    /// Who may list books.
    #[arg(long, value_enum, default_value_t = AuthorityMode::Open, env = "RENTAL_AUTHORITY")]
    authority: AuthorityMode,
    /// Handling of rent payments above price + deposit.
    #[arg(long, value_enum, default_value_t = OverpaymentMode::Reject, env = "RENTAL_OVERPAYMENT")]
    overpayment: OverpaymentMode,
    /// Let a withdrawal with nothing owed succeed with 0 instead of failing.
    #[arg(long, default_value_t = false)]
    allow_empty_withdrawal: bool,
    /// Whole minutes before penalties accrue.
    #[arg(long, default_value_t = GRACE_MINUTES)]
    grace_minutes: u64,
    /// Whole minutes after which the deposit is forfeited.
    #[arg(long, default_value_t = FORFEIT_AFTER_MINUTES)]
    forfeit_after_minutes: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the settlement for a return after the given time.
    Quote {
        #[arg(long)]
        daily_price: Amount,
        #[arg(long)]
        deposit: Amount,
        /// Seconds since the rental started.
        #[arg(long)]
        elapsed_secs: u64,
    },
    /// Replay a scenario file and print the report as JSON.
    Replay {
        scenario: PathBuf,
        /// Exit with an error if any step deviates from its expectation.
        #[arg(long, default_value_t = false)]
        strict: bool,
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
}

fn resolve_config(cli: &Cli) -> anyhow::Result<RentalConfig> {
    if cli.grace_minutes > cli.forfeit_after_minutes {
        bail!(
            "grace period ({} min) exceeds forfeit threshold ({} min)",
            cli.grace_minutes,
            cli.forfeit_after_minutes
        );
    }

    Ok(RentalConfig {
        authority: match cli.authority {
            AuthorityMode::Open => ListingAuthority::Open,
            AuthorityMode::AdminOnly => ListingAuthority::AdministratorOnly,
        },
        overpayment: match cli.overpayment {
            OverpaymentMode::Reject => OverpaymentPolicy::Reject,
            OverpaymentMode::Refund => OverpaymentPolicy::RefundExcess,
        },
        reject_empty_withdrawal: !cli.allow_empty_withdrawal,
        penalty: PenaltySchedule {
            grace_minutes: cli.grace_minutes,
            forfeit_after_minutes: cli.forfeit_after_minutes,
        },
        ..RentalConfig::with_administrator(cli.administrator.as_str())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "rental_cli=info,rental_core=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Quote {
            daily_price,
            deposit,
            elapsed_secs,
        } => {
            if daily_price.checked_add(deposit).is_none() {
                bail!("daily price plus deposit overflows");
            }
            let settlement = config
                .penalty
                .settle(daily_price, deposit, elapsed_secs / 60);
            println!("{}", serde_json::to_string_pretty(&settlement)?);
        }
        Command::Replay {
            scenario,
            strict,
            pretty,
        } => {
            let parsed = Scenario::load(&scenario)?;
            let report = run_scenario(parsed, config).await?;
            let rendered = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{rendered}");

            let unexpected = report.unexpected();
            for outcome in &unexpected {
                warn!(index = outcome.index, action = outcome.action, "step deviated from expectation");
            }
            info!(
                steps = report.outcomes.len(),
                deviations = unexpected.len(),
                solvent = report.solvent,
                "replay finished"
            );
            if !report.solvent {
                bail!("escrow is not solvent after replay");
            }
            if strict && !unexpected.is_empty() {
                bail!("{} step(s) deviated from expectation", unexpected.len());
            }
        }
    }

    Ok(())
}
