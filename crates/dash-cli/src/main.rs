mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dash_audio::{run_event_loop, run_now_playing, Dispatcher, FileDsp, NowPlayingFile};
use dash_link::{doctor as link_doctor, shutdown_channel, SerialLink, Shutdown};
use dash_nav::{doctor as nav_doctor, Acquisition, JsonlSink, NmeaReplay, ReceiverConfigurator};

use config::{load_config, Config};

#[derive(Debug, Parser)]
#[command(name = "dashlink", version, about = "dashlink - head-unit, DSP and GNSS bridge for the car")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run all loops until Ctrl-C / SIGTERM.
    Run,
    Doctor,
    /// Push the startup configuration to the GNSS receiver and exit.
    ConfigureReceiver,
    /// Parse a captured NMEA log and print every fix as JSON.
    Replay {
        #[arg(long)]
        file: String,
    },
}

/// Built once by `run` and shared by every task.
struct AppContext {
    headunit: Arc<SerialLink>,
    receiver: Arc<SerialLink>,
    dsp: Arc<FileDsp>,
    media: Option<Arc<NowPlayingFile>>,
    power: Arc<AtomicBool>,
    shutdown: Shutdown,
}

impl AppContext {
    fn new(cfg: &Config, shutdown: Shutdown) -> Self {
        let link = cfg.link.to_config();
        let empty = || FileDsp::in_memory(serde_json::Value::Object(Default::default()));
        let dsp = match &cfg.dsp.config_file {
            Some(path) => FileDsp::open(path).unwrap_or_else(|e| {
                warn!("dsp config unusable, rear bass control disabled: {:#}", e);
                empty()
            }),
            None => empty(),
        };
        Self {
            headunit: Arc::new(SerialLink::serial(&cfg.headunit.device, cfg.headunit.baud, link.clone())),
            receiver: Arc::new(SerialLink::serial(&cfg.receiver.device, cfg.receiver.baud, link)),
            dsp: Arc::new(dsp),
            media: cfg.media.now_playing_file.as_ref().map(|p| Arc::new(NowPlayingFile::new(p))),
            power: Arc::new(AtomicBool::new(false)),
            shutdown,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Run => run(&cfg).await?,
        Command::Doctor => doctor(&cfg).await?,
        Command::ConfigureReceiver => configure_receiver(&cfg).await?,
        Command::Replay { file } => replay(&file).await?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    link_doctor::check_device("headunit", &cfg.headunit.device, cfg.headunit.baud)?;
    link_doctor::check_device("receiver", &cfg.receiver.device, cfg.receiver.baud)?;
    link_doctor::check_timing(&cfg.link.to_config())?;

    nav_doctor::check_receiver(cfg.receiver.rate_hz)?;
    nav_doctor::check_cycle(cfg.acquire.cycle_ms)?;
    nav_doctor::check_storage(&cfg.storage.path)?;

    if let Some(path) = &cfg.dsp.config_file {
        FileDsp::open(path).map(|_| ()).or_else(|e| {
            warn!("dsp config unusable, rear bass control disabled: {:#}", e);
            Ok::<(), anyhow::Error>(())
        })?;
    }
    anyhow::ensure!(cfg.media.poll_ms >= 100, "media.poll_ms should be >= 100");

    info!("doctor: OK");
    Ok(())
}

async fn configure_receiver(cfg: &Config) -> Result<()> {
    let link = SerialLink::serial(&cfg.receiver.device, cfg.receiver.baud, cfg.link.to_config());
    link.connect().await.with_context(|| format!("open receiver {}", cfg.receiver.device))?;

    let sent = ReceiverConfigurator::new(&link, cfg.receiver.settings()).apply().await;
    link.close().await;

    anyhow::ensure!(sent == 5, "only {}/5 configuration frames written", sent);
    println!("receiver {} configured: {} Hz, {:?}", cfg.receiver.device, cfg.receiver.rate_hz, cfg.receiver.dynamics);
    Ok(())
}

async fn replay(file: &str) -> Result<()> {
    let mut src = NmeaReplay::open(file).await?;
    let mut n = 0usize;
    while let Some(fix) = src.next_fix().await? {
        println!("{}", serde_json::to_string(&fix)?);
        n += 1;
    }
    info!("replay: {} fixes from {}", n, file);
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    let (trigger, shutdown) = shutdown_channel();
    let ctx = AppContext::new(cfg, shutdown);

    // fire-and-forget; the receiver may not be plugged in yet
    ReceiverConfigurator::new(ctx.receiver.as_ref(), cfg.receiver.settings()).apply().await;

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    {
        let receiver = ctx.receiver.clone();
        let headunit = ctx.headunit.clone();
        let sink = JsonlSink::new(&cfg.storage.path);
        let mut acq = Acquisition::new(cfg.acquire.to_config());
        let shutdown = ctx.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            acq.run(receiver.as_ref(), headunit.as_ref(), &sink, shutdown).await;
        }));
    }

    {
        let headunit = ctx.headunit.clone();
        let dispatcher = Dispatcher::new(ctx.dsp.clone(), ctx.power.clone());
        let shutdown = ctx.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_event_loop(headunit.as_ref(), &dispatcher, shutdown).await;
        }));
    }

    match &ctx.media {
        Some(media) => {
            let headunit = ctx.headunit.clone();
            let media = media.clone();
            let period = Duration::from_millis(cfg.media.poll_ms);
            let shutdown = ctx.shutdown.clone();
            tasks.push(tokio::spawn(async move {
                run_now_playing(headunit.as_ref(), media.as_ref(), period, shutdown).await;
            }));
        }
        None => info!("run: media.now_playing_file not set, track info disabled"),
    }

    wait_for_signal().await?;
    info!("run: shutting down");
    trigger.trigger();

    for t in tasks {
        if let Err(e) = t.await {
            warn!("run: task ended abnormally: {}", e);
        }
    }
    ctx.headunit.close().await;
    ctx.receiver.close().await;
    info!("run: stopped (power was {})", if ctx.power.load(Ordering::SeqCst) { "on" } else { "off" });
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("wait for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    Ok(())
}
