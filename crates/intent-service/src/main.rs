//! Main entry point for the intent filler service.
//!
//! Starts a local ledger for every configured network, builds the filler
//! engine on top of them and hands it the intake payloads given on the
//! command line, plus the configured demo order if there is one.

use clap::Parser;
use intent_config::Config;
use intent_filler::{FillerBuilder, FillerFactories};
use intent_types::{truncate_id, FulfillmentStatus, IntakePayload};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod demo;
mod devnet;

/// Command-line arguments for the filler service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/devnet.toml")]
	config: PathBuf,

	/// Intake payload JSON file; may be repeated
	#[arg(short, long)]
	intake: Vec<PathBuf>,

	/// Seconds to wait for each submitted intake to settle
	#[arg(long, default_value_t = 120)]
	settle_timeout: u64,

	/// Exit once every submitted intake has settled instead of waiting for Ctrl-C
	#[arg(long)]
	once: bool,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

async fn read_intake(path: &Path) -> Result<IntakePayload, Box<dyn std::error::Error>> {
	let raw = tokio::fs::read_to_string(path).await?;
	let payload = serde_json::from_str(&raw)
		.map_err(|e| format!("Invalid intake payload {}: {}", path.display(), e))?;
	Ok(payload)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started filler");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path {} is not valid UTF-8", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.filler.id);

	let chains = devnet::launch(&config).await?;

	let mut intakes = Vec::with_capacity(args.intake.len() + 1);
	for path in &args.intake {
		intakes.push(read_intake(path).await?);
	}
	if let Some(demo) = &config.demo {
		intakes.push(demo::signed_intake(demo, &config, &chains).await?);
	}

	let engine = FillerBuilder::new(config.clone())
		.build(FillerFactories::all(), chains.clone())
		.await?;
	let runner = engine.clone();
	let handle = tokio::spawn(async move { runner.run().await });

	let mut ids = Vec::with_capacity(intakes.len());
	for payload in intakes {
		match engine.process_intake(payload).await {
			Ok(id) => ids.push(id),
			Err(e) => tracing::error!(error = %e, "Intake refused"),
		}
	}

	let timeout = Duration::from_secs(args.settle_timeout);
	for id in &ids {
		match engine.wait_until_settled(id, timeout).await {
			Ok(fulfillment) => match fulfillment.status {
				FulfillmentStatus::Finalized => {
					tracing::info!(fulfillment_id = %truncate_id(id), "Settled")
				},
				status => {
					tracing::warn!(fulfillment_id = %truncate_id(id), status = %status, "Not settled")
				},
			},
			Err(e) => tracing::error!(fulfillment_id = %truncate_id(id), error = %e, "Settlement wait failed"),
		}
	}
	if !ids.is_empty() {
		devnet::log_balances(&config, &chains, &[engine.filler_address()]).await;
	}

	if args.once {
		engine.stop();
	}
	handle.await??;

	tracing::info!("Stopped filler");
	Ok(())
}
