use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{error, info, warn};

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
pub enum JobError {
	WorkerDied {
		name: String,
	},
	RestartLimitExceeded {
		max_restarts: u32,
	},
}

impl fmt::Display for JobError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::WorkerDied { name } => {
				write!(f, "worker {:?} unexpectedly exited", name)
			}
			Self::RestartLimitExceeded { max_restarts } => {
				write!(f, "workers were restarted more than {} times", max_restarts)
			}
		}
	}
}

impl Error for JobError {}

/// How long a worker rests between being killed and being re-spawned.
const RESTART_PAUSE: Duration = Duration::from_secs(1);

/// How often the supervisor checks on its workers.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A named background task built from a stored factory.
///
/// A finished or aborted task cannot be resumed, so every (re)start spawns a
/// fresh one from the factory. The target runs to completion on its own; a
/// clean return and an error both count as death from the supervisor's point
/// of view, because workers are expected to outlive their monitoring window.
pub struct Worker {
	name: String,
	factory: Box<dyn Fn() -> JoinHandle<()> + Send>,
	handle: Option<JoinHandle<()>>,
}

impl Worker {
	/// Wrap a fallible future-producing closure into a worker.
	pub fn new<N, F, Fut, E>(name: N, target: F) -> Self
	where
		N: Into<String>,
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let name = name.into();
		let task_name = name.clone();
		let factory = move || {
			let fut = target();
			let task_name = task_name.clone();
			tokio::spawn(async move {
				match fut.await {
					Ok(()) => {
						info!("worker {:?} finished", task_name);
					}
					Err(e) => {
						error!("worker {:?} failed: {}", task_name, e);
					}
				}
			})
		};
		Self {
			name,
			factory: Box::new(factory),
			handle: None,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn start(&mut self) {
		if self.is_alive() {
			warn!("worker {:?} is already running", self.name);
			return;
		}
		info!("starting {:?} worker", self.name);
		self.handle = Some((self.factory)());
	}

	pub fn is_alive(&self) -> bool {
		match &self.handle {
			Some(handle) => !handle.is_finished(),
			None => false,
		}
	}

	/// Stop the task and wait for it to wind down.
	pub async fn kill(&mut self) {
		if let Some(handle) = self.handle.take() {
			handle.abort();
			// a JoinError here just reports the abort
			let _ = handle.await;
		}
	}

	/// Kill, take a breath, spawn a fresh task from the factory.
	pub async fn restart(&mut self) {
		info!("restarting {:?} worker", self.name);
		self.kill().await;
		tokio::time::sleep(RESTART_PAUSE).await;
		self.start();
	}
}

impl fmt::Debug for Worker {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Worker")
			.field("name", &self.name)
			.field("alive", &self.is_alive())
			.finish()
	}
}

/// An ordered cohort of workers which live and die together.
///
/// The workers cooperate through the filesystem, so a crash of one leaves
/// the others referencing state which no longer advances; recovery always
/// restarts the whole cohort.
pub struct Job {
	workers: Vec<Worker>,
}

impl Job {
	pub fn new(workers: Vec<Worker>) -> Self {
		Self { workers }
	}

	pub fn start(&mut self) {
		for worker in self.workers.iter_mut() {
			worker.start();
		}
	}

	pub async fn kill(&mut self) {
		info!("terminating workers");
		for worker in self.workers.iter_mut() {
			if worker.is_alive() {
				worker.kill().await;
			}
		}
		info!("all workers terminated");
	}

	pub fn any_alive(&self) -> bool {
		self.workers.iter().any(|w| w.is_alive())
	}

	fn first_dead(&self) -> Option<&Worker> {
		self.workers.iter().find(|w| !w.is_alive())
	}

	/// Kill every worker, pause once, then bring the whole cohort back.
	async fn restart_all(&mut self) {
		info!("restarting all workers");
		for worker in self.workers.iter_mut() {
			worker.kill().await;
		}
		tokio::time::sleep(RESTART_PAUSE).await;
		for worker in self.workers.iter_mut() {
			worker.start();
		}
	}

	/// Watch the cohort for `total_runtime`.
	///
	/// A dead worker either brings the job down (`force_restart` off) or
	/// triggers a restart of the whole cohort, up to `max_restarts` times.
	/// An interrupt or the elapsed runtime ends the job cleanly.
	pub async fn monitor(
		&mut self,
		total_runtime: Duration,
		force_restart: bool,
		max_restarts: u32,
	) -> Result<(), JobError> {
		info!("monitoring workers");
		let deadline = Instant::now() + total_runtime;
		let mut restarts = 0u32;

		loop {
			let poll = tokio::time::sleep(POLL_INTERVAL);
			tokio::select! {
				_ = poll => (),
				_ = tokio::signal::ctrl_c() => {
					info!("interrupt received, terminating workers");
					self.kill().await;
					return Ok(());
				}
			}

			if let Some(dead) = self.first_dead() {
				let name = dead.name().to_string();
				error!("worker {:?} unexpectedly exited", name);
				if !force_restart {
					self.kill().await;
					return Err(JobError::WorkerDied { name });
				}
				self.restart_all().await;
				restarts += 1;
				if restarts > max_restarts {
					warn!("giving up after {} restarts", restarts);
					self.kill().await;
					return Err(JobError::RestartLimitExceeded { max_restarts });
				}
			}

			if Instant::now() >= deadline {
				info!("session duration reached, terminating workers");
				self.kill().await;
				return Ok(());
			}
		}
	}
}
