//! Command-line entry point of the Safe transfer relay.
//!
//! Loads the configuration, builds the transfer workflow and runs one
//! command. Results are printed as JSON on stdout, logs go to stderr.

use clap::{Parser, Subcommand};
use safe_config::Config;
use safe_core::payload::{parse_amount, parse_recipient, parse_token_amount};
use safe_core::{TransferRequest, WorkflowBuilder, WorkflowError};
use safe_types::TransactionHash;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments for the relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml", env = "SAFE_TRANSFER_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Transfer tokens from the Safe, one recipient per --to/--amount pair
	Transfer {
		/// Recipient address
		#[arg(long, required = true)]
		to: Vec<String>,

		/// Amount in the token's smallest unit, or in whole tokens with --units
		#[arg(long, required = true)]
		amount: Vec<String>,

		/// Read amounts as decimal token amounts scaled by the token decimals
		#[arg(long)]
		units: bool,
	},
	/// Re-check a submitted transaction
	Status {
		/// Chain transaction hash printed by a previous transfer
		#[arg(long)]
		tx_hash: TransactionHash,
	},
	/// Show the Safe owners, threshold, nonce and balances
	Info,
}

/// Pairs `--to` and `--amount` values in order.
fn transfer_requests(
	to: &[String],
	amount: &[String],
	units: bool,
	decimals: u8,
) -> Result<Vec<TransferRequest>, WorkflowError> {
	if to.len() != amount.len() {
		return Err(WorkflowError::Encoding(format!(
			"Got {} recipient(s) but {} amount(s)",
			to.len(),
			amount.len()
		)));
	}

	to.iter()
		.zip(amount)
		.map(|(to, amount)| -> Result<TransferRequest, WorkflowError> {
			let recipient = parse_recipient(to)?;
			let amount = if units {
				parse_token_amount(amount, decimals)?
			} else {
				parse_amount(amount)?
			};
			Ok(TransferRequest::new(recipient, amount))
		})
		.collect()
}

async fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		safe = %config.safe.address,
		chain_id = config.safe.chain_id,
		token = %config.token.symbol,
		"Loaded configuration"
	);

	let workflow = WorkflowBuilder::from_config(&config).build()?;

	let output = match args.command {
		Command::Transfer { to, amount, units } => {
			let requests = transfer_requests(&to, &amount, units, config.token.decimals)?;
			let receipt = workflow.transfer(&requests).await?;
			serde_json::to_string_pretty(&receipt)?
		}
		Command::Status { tx_hash } => {
			let status = workflow.status(&tx_hash).await?;
			serde_json::to_string_pretty(&status)?
		}
		Command::Info => {
			let info = workflow.safe_info().await?;
			serde_json::to_string_pretty(&info)?
		}
	};
	Ok(output)
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();

	match run(args).await {
		Ok(output) => {
			println!("{}", output);
			ExitCode::SUCCESS
		}
		Err(e) => {
			tracing::error!(error = %e, "Command failed");
			eprintln!("Error: {}", e);
			ExitCode::FAILURE
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use safe_types::{Address, U256};

	const RECIPIENT: &str = "0x82508c7cf44252f9a6d140684d8a725f03078f6e";

	#[test]
	fn test_parse_transfer_command() {
		let args = Args::try_parse_from([
			"safe-transfer",
			"--config",
			"relay.toml",
			"transfer",
			"--to",
			RECIPIENT,
			"--amount",
			"1000000",
			"--to",
			"0x3C5D253E8eC05F7F75D74cDa0fB999C55007F40E",
			"--amount",
			"5",
		])
		.unwrap();

		assert_eq!(args.config, PathBuf::from("relay.toml"));
		assert_eq!(args.log_level, "info");
		match args.command {
			Command::Transfer { to, amount, units } => {
				assert_eq!(to.len(), 2);
				assert_eq!(amount, vec!["1000000".to_string(), "5".to_string()]);
				assert!(!units);
			}
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[test]
	fn test_parse_status_command() {
		let hash = format!("0x{}", "ab".repeat(32));
		let args = Args::try_parse_from(["safe-transfer", "status", "--tx-hash", &hash]).unwrap();

		assert!(matches!(args.command, Command::Status { tx_hash } if tx_hash.to_string() == hash));
		assert!(Args::try_parse_from(["safe-transfer", "status", "--tx-hash", "0x12"]).is_err());
	}

	#[test]
	fn test_transfer_requires_recipient() {
		assert!(Args::try_parse_from(["safe-transfer", "transfer", "--amount", "1"]).is_err());
		assert!(Args::try_parse_from(["safe-transfer"]).is_err());
	}

	#[test]
	fn test_transfer_requests_pairing() {
		let requests = transfer_requests(
			&[RECIPIENT.to_string()],
			&["1.5".to_string()],
			true,
			6,
		)
		.unwrap();

		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].recipient, RECIPIENT.parse::<Address>().unwrap());
		assert_eq!(requests[0].amount, U256::from(1_500_000u64));

		let mismatched = transfer_requests(&[RECIPIENT.to_string()], &[], false, 6);
		assert!(matches!(mismatched, Err(WorkflowError::Encoding(_))));

		let bad_amount = transfer_requests(&[RECIPIENT.to_string()], &["1.5".to_string()], false, 6);
		assert!(matches!(bad_amount, Err(WorkflowError::Encoding(_))));
	}
}
