use std::time::Duration;

use structopt::StructOpt;

use spectre::capture_config::CaptureConfig;
use spectre::config::Paths;
use spectre::jobs::Job;
use spectre::logs;
use spectre::params::parse_string_parameters;
use spectre::receiver::{capture_worker, get_receiver, post_processing_worker};

#[derive(Debug, StructOpt)]
#[structopt(about = "capture radio spectrograms from SDR I/Q streams")]
enum Command {
	/// Validate parameters and persist a capture config for a tag.
	CreateConfig {
		#[structopt(long)]
		tag: String,
		#[structopt(long)]
		receiver: String,
		#[structopt(long)]
		mode: String,
		/// Parameters as KEY=VALUE pairs.
		#[structopt(short = "p", long = "param")]
		params: Vec<String>,
		/// Overwrite an existing config.
		#[structopt(long)]
		force: bool,
	},
	/// Run a capture session: capture and post-processing workers under a
	/// supervisor, for a bounded runtime.
	Start {
		#[structopt(long)]
		tag: String,
		#[structopt(long, default_value = "0")]
		seconds: u64,
		#[structopt(long, default_value = "0")]
		minutes: u64,
		#[structopt(long, default_value = "0")]
		hours: u64,
		/// Restart all workers when one dies instead of giving up.
		#[structopt(long)]
		force_restart: bool,
		#[structopt(long, default_value = "5")]
		max_restarts: u32,
	},
	/// Show a stored capture config.
	ShowConfig {
		#[structopt(long)]
		tag: String,
	},
}

fn total_runtime(seconds: u64, minutes: u64, hours: u64) -> Result<Duration, String> {
	let total = seconds + minutes * 60 + hours * 3600;
	if total == 0 {
		return Err("the total runtime must be strictly positive".to_string());
	}
	Ok(Duration::from_secs(total))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let command = Command::from_args();
	let paths = Paths::from_env()?;
	paths.ensure_tree()?;

	match command {
		Command::CreateConfig {
			tag,
			receiver,
			mode,
			params,
			force,
		} => {
			logs::configure_stderr_logging();
			let parameters = parse_string_parameters(&params)?;
			let mut receiver = get_receiver(&receiver)?;
			receiver.set_active_mode(&mode)?;
			let path = receiver.write_config(&paths, &tag, &parameters, force)?;
			println!("wrote {}", path.display());
		}
		Command::Start {
			tag,
			seconds,
			minutes,
			hours,
			force_restart,
			max_restarts,
		} => {
			let log_path = logs::configure_file_logging(&paths, logs::ProcessKind::User)?;
			eprintln!("logging to {}", log_path.display());
			let runtime = total_runtime(seconds, minutes, hours)?;
			// the consumer goes first so no early batch is missed
			let mut job = Job::new(vec![
				post_processing_worker(paths.clone(), tag.clone()),
				capture_worker(paths.clone(), tag),
			]);
			job.start();
			job.monitor(runtime, force_restart, max_restarts).await?;
		}
		Command::ShowConfig { tag } => {
			logs::configure_stderr_logging();
			let config = CaptureConfig::load(&paths, &tag)?;
			println!("receiver: {}", config.receiver_name());
			println!("mode:     {}", config.receiver_mode());
			for (name, value) in config.parameters().iter() {
				println!("{} = {}", name, value);
			}
		}
	}
	Ok(())
}
