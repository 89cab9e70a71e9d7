use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use console::style;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use narrator::cli::{Cli, Command, RequesterArgs};
use narrator::config::NarratorConfig;
use narrator::executor::RetryExecutor;
use narrator::orchestrator::{CreateJobRequest, JobOrchestrator};
use narrator::precondition::VoiceRegistry;
use narrator::state_machine::{Job, JobStatus, Requester};
use narrator::store::{FileJobStore, InMemoryJobStore, JobStore};
use narrator::synthesis::{HttpSynthesizer, SynthesisBackend};
use narrator::ui::{self, JobProgress};
use narrator::worker::SynthesisWorker;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Requester used when `synth` is given neither `--user` nor `--guest`.
const LOCAL_USER: &str = "local";

const DEMO_TEXTS: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "Serialized synthesis keeps one model busy at a time.",
    "Every job reaches a terminal status.",
    "Retries are bounded by the configured policy.",
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG > --log-level > warn (info with --verbose).
    let fallback = match (cli.log_level, cli.verbose) {
        (Some(level), _) => level.as_str(),
        (None, true) => "info",
        (None, false) => "warn",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .init();

    let mut config = NarratorConfig::load(cli.config.as_deref())?;
    if let Some(attempts) = cli.max_attempts {
        config.max_attempts = attempts.max(1);
    }

    match cli.command {
        Command::Synth {
            text,
            voice,
            lang,
            requester,
            remote,
        } => {
            let owner = requester
                .requester()
                .unwrap_or_else(|| Requester::User(LOCAL_USER.to_string()));
            let mut request = CreateJobRequest::new(owner, text, lang);
            if let Some(voice) = voice {
                request = request.with_voice(voice);
            }
            run_synth(&config, request, remote, cli.verbose).await
        }
        Command::Status { id } => {
            let job = read_only_orchestrator(&config)?.get_job(&id)?;
            ui::print_record(&job);
            Ok(())
        }
        Command::List {
            requester,
            status,
            stale_secs,
        } => run_list(&config, &requester, status, stale_secs),
        Command::Demo { jobs } => run_demo(&config, jobs).await,
    }
}

fn build_orchestrator(
    config: &NarratorConfig,
    store: Arc<dyn JobStore>,
    backend: Arc<dyn SynthesisBackend>,
) -> JobOrchestrator {
    let registry = Arc::new(VoiceRegistry::with_voices(config.voices.clone()));
    JobOrchestrator::new(
        store,
        registry,
        backend,
        RetryExecutor::new(config.retry_policy()),
    )
    .with_default_preset(config.preset.clone())
}

/// Orchestrator over the on-disk store for commands that never create jobs.
fn read_only_orchestrator(config: &NarratorConfig) -> Result<JobOrchestrator> {
    let store = Arc::new(FileJobStore::open(&config.store_dir)?);
    let backend = Arc::new(HttpSynthesizer::with_timeout(
        config.tts_api_url.clone(),
        config.request_timeout(),
    )?);
    Ok(build_orchestrator(config, store, backend))
}

fn spawn_local_worker(config: &NarratorConfig) -> Result<SynthesisWorker> {
    SynthesisWorker::spawn(config.local_resource(), config.worker_config())
        .context("failed to start synthesis worker")
}

async fn stop_worker(worker: SynthesisWorker) -> Result<()> {
    tokio::task::spawn_blocking(move || worker.join())
        .await?
        .map_err(|_| anyhow!("synthesis worker panicked"))
}

async fn run_synth(
    config: &NarratorConfig,
    request: CreateJobRequest,
    remote: bool,
    verbose: bool,
) -> Result<()> {
    let store = Arc::new(FileJobStore::open(&config.store_dir)?);

    let (backend, worker): (Arc<dyn SynthesisBackend>, Option<SynthesisWorker>) = if remote {
        let client = HttpSynthesizer::with_timeout(
            config.tts_api_url.clone(),
            config.request_timeout(),
        )?;
        info!(endpoint = %client.endpoint(), "using remote TTS service");
        (Arc::new(client), None)
    } else {
        let worker = spawn_local_worker(config)?;
        (Arc::new(worker.handle()), Some(worker))
    };

    let orchestrator = build_orchestrator(config, store, backend);
    let created = orchestrator.create_job(request)?;

    let progress = JobProgress::start(&created);
    let started = Instant::now();
    let deadline = config.job_deadline();
    let mut last_attempt = 0;
    let job = loop {
        let job = orchestrator.get_job(&created.id)?;
        if verbose && job.attempt_count > last_attempt && last_attempt > 0 {
            progress.retry(last_attempt, config.max_attempts);
        }
        last_attempt = job.attempt_count;
        progress.update(&job);
        if job.is_terminal() || started.elapsed() >= deadline {
            break job;
        }
        sleep(POLL_INTERVAL).await;
    };
    progress.complete(&job);
    ui::print_record(&job);

    if let Some(worker) = worker {
        stop_worker(worker).await?;
    }

    match job.status {
        JobStatus::Ready => Ok(()),
        JobStatus::Failed => bail!("job {} failed", job.id),
        other => {
            warn!(job_id = %job.id, status = %other, "gave up waiting for job");
            bail!("job {} still {other}; check it later with `narrator status`", job.id)
        }
    }
}

fn run_list(
    config: &NarratorConfig,
    requester: &RequesterArgs,
    status: Option<JobStatus>,
    stale_secs: Option<u64>,
) -> Result<()> {
    let orchestrator = read_only_orchestrator(config)?;
    let owner = requester.requester();

    let jobs: Vec<Job> = match stale_secs {
        Some(secs) => orchestrator
            .stale_jobs(Duration::from_secs(secs))?
            .into_iter()
            .filter(|j| owner.as_ref().is_none_or(|o| &j.owner == o))
            .collect(),
        None => orchestrator.list_jobs(owner.as_ref(), status)?,
    };
    ui::print_table(&jobs);
    Ok(())
}

async fn run_demo(config: &NarratorConfig, jobs: u32) -> Result<()> {
    let worker = spawn_local_worker(config)?;
    let orchestrator = build_orchestrator(
        config,
        Arc::new(InMemoryJobStore::new()),
        Arc::new(worker.handle()),
    );

    println!(
        "{} submitting {jobs} jobs to one worker ({}ms per call)",
        style("▶").cyan().bold(),
        config.worker_latency_ms
    );

    let started = Instant::now();
    let mut ids = Vec::new();
    for i in 0..jobs as usize {
        let text = DEMO_TEXTS[i % DEMO_TEXTS.len()];
        let owner = Requester::User(format!("demo{i}"));
        let job = orchestrator.create_job(CreateJobRequest::new(owner, text, "en"))?;
        ids.push(job.id);
    }
    let submitted = started.elapsed();

    let mut finished = Vec::new();
    for id in &ids {
        finished.push(
            orchestrator
                .await_terminal(id, POLL_INTERVAL, config.job_deadline().saturating_mul(jobs))
                .await?,
        );
    }
    let total = started.elapsed();

    ui::print_table(&finished);
    println!();
    println!("  submitted in {submitted:?}, all terminal after {total:?}");
    println!(
        "  lower bound for serialized calls: {:?}",
        config.worker_latency().saturating_mul(jobs)
    );

    let worker_handle = worker.handle();
    println!(
        "  worker processed {} call(s), {} failed",
        worker_handle.processed(),
        worker_handle.failed()
    );
    stop_worker(worker).await
}
