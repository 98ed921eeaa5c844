//! Headless slideshow panel: loads a manifest, cycles slides on an in-memory
//! stage and logs every transition. Operator commands arrive on stdin.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use humantime::format_duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use image_panel::config::Configuration;
use image_panel::events::Displayed;
use image_panel::loader::MediaLoader;
use image_panel::stage::SceneGraph;
use image_panel::tasks::{control, panel};

#[derive(Debug, Parser)]
#[command(name = "image-panel", version, about = "Cross-fading slideshow panel")]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Manifest URL or path (overrides `data` from the config)
    #[arg(long, value_name = "URL")]
    data: Option<String>,
    /// Override the manifest's slide interval (ms)
    #[arg(long, value_name = "MILLIS")]
    interval_ms: Option<u64>,
    /// Override the manifest's transition duration (ms)
    #[arg(long, value_name = "MILLIS")]
    fade_duration_ms: Option<u64>,
    /// Deterministic seed for manifest shuffling
    #[arg(long, value_name = "SEED")]
    shuffle_seed: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "image_panel=debug,info",
        _ => "image_panel=trace,debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(data) = args.data {
        cfg.data = Some(data);
    }
    if let Some(ms) = args.interval_ms {
        cfg.interval_ms = Some(ms);
    }
    if let Some(ms) = args.fade_duration_ms {
        cfg.fade_duration_ms = Some(ms);
    }
    if let Some(seed) = args.shuffle_seed {
        cfg.shuffle_seed = Some(seed);
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    if cfg.data.is_none() {
        bail!("no manifest source: pass --data or set `data` in the config");
    }
    tracing::info!(
        request_timeout = %format_duration(cfg.request_timeout),
        "configuration:\n{cfg:#?}"
    );

    let loader = Arc::new(MediaLoader::new(cfg.request_timeout).context("building http client")?);
    let stage = SceneGraph::new();
    let (handle, commands) = panel::channel(cfg.command_buffer);
    let (displayed_tx, mut displayed_rx) = mpsc::channel::<Displayed>(16);
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => {
                    let mut paused = false;
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            received = sigusr1.recv() => {
                                if received.is_none() {
                                    break;
                                }
                                paused = !paused;
                                tracing::info!(paused, "SIGUSR1 received; toggling pause");
                                let sent = if paused { handle.pause().await } else { handle.resume().await };
                                if let Err(err) = sent {
                                    tracing::warn!("failed to forward pause toggle: {err}");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    tasks.spawn({
        let loader = Arc::clone(&loader);
        let stage = stage.clone();
        let cancel = cancel.clone();
        let options = panel::PanelOptions {
            shuffle_seed: cfg.shuffle_seed,
        };
        async move {
            panel::run(commands, displayed_tx, loader, stage, cancel, options)
                .await
                .context("panel task failed")
        }
    });

    // Stdin EOF (Ctrl-D) ends the session like Ctrl-C.
    tasks.spawn({
        let handle = handle.clone();
        let cancel = cancel.clone();
        async move {
            let stdin = BufReader::new(tokio::io::stdin());
            let res = control::run(stdin, handle, cancel.clone())
                .await
                .context("control task failed");
            cancel.cancel();
            res
        }
    });

    tasks.spawn({
        let cancel = cancel.clone();
        let stage = stage.clone();
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = displayed_rx.recv() => match maybe {
                        Some(Displayed { index, image_url }) => tracing::info!(
                            index,
                            url = %image_url,
                            layers = stage.len(),
                            "now showing"
                        ),
                        None => break,
                    },
                }
            }
            Ok(())
        }
    });

    for (name, value) in cfg.attributes() {
        handle
            .set_attribute(name, Some(value))
            .await
            .with_context(|| format!("failed to apply attribute {name}"))?;
    }

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
