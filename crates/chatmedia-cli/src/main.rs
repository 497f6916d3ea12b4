use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatmedia_contracts::config::PipelineConfig;
use chatmedia_contracts::events::{EventKind, EventWriter};
use chatmedia_contracts::locale::Locale;
use chatmedia_contracts::media::MediaFile;
use chatmedia_contracts::messages::{fragments_from_chunk, Fragment, Message, Role};
use chatmedia_contracts::pressure::{AlertHistory, MemoryPressureResult, MemoryPressureSample};
use chatmedia_engine::{
    alert_copy, collect_stream, AttachmentComposer, DeviceSignals, IntakeReport, MediaPipeline,
    MemoryPressureMonitor, Resolution,
};
use clap::{Parser, Subcommand};
use futures::stream;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CHATMEDIA_LOG";

#[derive(Debug, Parser)]
#[command(name = "chatmedia-rs", version, about = "Chat media intake and response assembly")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Check(CheckArgs),
    Pressure(PressureArgs),
    Assemble(AssembleArgs),
}

#[derive(Debug, Parser)]
struct CheckArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(long, default_value_t = 0)]
    messages: u64,
    #[arg(long, default_value_t = 0)]
    stored_image_bytes: u64,
    #[arg(long, default_value = "en")]
    locale: Locale,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PressureArgs {
    #[arg(long, default_value_t = 0)]
    messages: u64,
    #[arg(long, default_value_t = 0)]
    stored_image_bytes: u64,
    #[arg(long, default_value_t = 0)]
    pending_bytes: u64,
    #[arg(long)]
    device_memory: Option<f64>,
    #[arg(long)]
    heap_ratio: Option<f64>,
    #[arg(long)]
    probe: bool,
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long, default_value = "en")]
    locale: Locale,
}

#[derive(Debug, Parser)]
struct AssembleArgs {
    chunks: PathBuf,
    #[arg(long, default_value = "model")]
    role: Role,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chatmedia-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    match cli.command {
        Command::Check(args) => runtime.block_on(run_check(args, &config)),
        Command::Pressure(args) => run_pressure(args, &config),
        Command::Assemble(args) => {
            let message = runtime.block_on(assemble_file(&args.chunks, args.role))?;
            println!("{}", serde_json::to_string_pretty(&message)?);
            Ok(if message.error { 2 } else { 0 })
        }
    }
}

async fn run_check(args: CheckArgs, config: &PipelineConfig) -> Result<i32> {
    let session_id = format!("session-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
    let events = args
        .events
        .as_ref()
        .map(|path| EventWriter::new(path.clone(), session_id.clone()));

    let mut files = Vec::with_capacity(args.files.len());
    let mut unreadable = 0;
    for path in &args.files {
        match MediaFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => {
                unreadable += 1;
                eprintln!("{}: {err:#}", path.display());
            }
        }
    }

    let mut pipeline = MediaPipeline::from_config(config);
    if let Some(events) = &events {
        pipeline = pipeline.with_events(events.clone());
    }
    let mut composer = AttachmentComposer::new(config.limits.clone());
    let reports = composer.add_files(&pipeline, &files).await;
    for report in &reports {
        print_report(report, args.locale, config);
    }

    let sample = DeviceSignals::probe().apply(MemoryPressureSample {
        message_count: args.messages,
        stored_image_bytes: args.stored_image_bytes,
        pending_upload_bytes: composer.committed_bytes(),
        device_memory_gb: None,
        heap_ratio: None,
    });
    let mut monitor = MemoryPressureMonitor::new(config.pressure.clone(), AlertHistory::new());
    let result = monitor.evaluate(&sample);
    let show = monitor.should_alert(&result);
    print_pressure(&result, show, config, args.locale);
    if let Some(events) = &events {
        events.emit(EventKind::PressureEvaluated, pressure_payload(&result, show))?;
    }

    if let Some(out_dir) = &args.out {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        for attachment in composer.submit() {
            let target = out_dir.join(&attachment.name);
            fs::write(&target, &attachment.bytes)
                .with_context(|| format!("failed to write {}", target.display()))?;
            debug!(path = %target.display(), "wrote attachment");
        }
    }

    let accepted = reports
        .iter()
        .filter(|report| matches!(report.resolution, Resolution::Accepted { .. }))
        .count();
    info!(accepted, total = args.files.len(), "check finished");
    Ok(if unreadable == 0 && accepted == args.files.len() { 0 } else { 2 })
}

fn print_report(report: &IntakeReport, locale: Locale, config: &PipelineConfig) {
    let status = match &report.resolution {
        Resolution::Accepted { .. } => "accepted",
        Resolution::Rejected { .. } => "rejected",
        Resolution::Discarded => "discarded",
        Resolution::Evicted => "evicted",
        Resolution::Failed { .. } => "failed",
    };
    match report
        .resolution
        .notice(&report.file_name, locale, &config.limits)
    {
        Some(notice) => println!("[{status}] {notice}"),
        None => println!("[{status}] {}", report.file_name),
    }
}

fn run_pressure(args: PressureArgs, config: &PipelineConfig) -> Result<i32> {
    let mut sample = MemoryPressureSample {
        message_count: args.messages,
        stored_image_bytes: args.stored_image_bytes,
        pending_upload_bytes: args.pending_bytes,
        device_memory_gb: args.device_memory,
        heap_ratio: args.heap_ratio,
    };
    if args.probe {
        sample = DeviceSignals::probe().apply(sample);
    }

    let history = match &args.history {
        Some(path) => load_history(path),
        None => AlertHistory::new(),
    };
    let mut monitor = MemoryPressureMonitor::new(config.pressure.clone(), history);
    let result = monitor.evaluate(&sample);
    let show = monitor.should_alert(&result);
    if let Some(path) = &args.history {
        save_history(path, monitor.history())?;
    }

    let alert = show.then(|| alert_copy(&result, &config.pressure, args.locale));
    let output = json!({
        "result": result,
        "should_alert": show,
        "alert": alert,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(0)
}

fn print_pressure(result: &MemoryPressureResult, show: bool, config: &PipelineConfig, locale: Locale) {
    println!(
        "pressure: {} ({} messages, {} MB images)",
        result.level.as_str(),
        result.message_count,
        result.image_mb
    );
    if show {
        let copy = alert_copy(result, &config.pressure, locale);
        println!("{}: {} [{}%]", copy.title, copy.message, copy.progress);
    }
}

fn pressure_payload(result: &MemoryPressureResult, show: bool) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("level".to_string(), json!(result.level));
    payload.insert("message_count".to_string(), json!(result.message_count));
    payload.insert("image_mb".to_string(), json!(result.image_mb));
    payload.insert("tier".to_string(), json!(result.tier));
    payload.insert("should_alert".to_string(), json!(show));
    payload
}

fn load_history(path: &Path) -> AlertHistory {
    let Ok(raw) = fs::read_to_string(path) else {
        return AlertHistory::new();
    };
    match serde_json::from_str(&raw) {
        Ok(history) => history,
        Err(err) => {
            warn!(path = %path.display(), "ignoring unreadable alert history: {err}");
            AlertHistory::new()
        }
    }
}

fn save_history(path: &Path, history: &AlertHistory) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(history)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn assemble_file(path: &Path, role: Role) -> Result<Message> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let items = chunk_items(&raw);
    Ok(collect_stream(stream::iter(items), role).await)
}

fn chunk_items(raw: &str) -> Vec<Result<Fragment>> {
    let mut items = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(chunk) => items.extend(fragments_from_chunk(&chunk).into_iter().map(Ok)),
            Err(err) => {
                items.push(Err(anyhow::anyhow!("chunk {} is not valid JSON: {err}", index + 1)));
            }
        }
    }
    items
}
