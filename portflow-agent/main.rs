use anyhow::Context;
use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use portflow::common::{msr, HostPlatform, Topology};
use portflow::config::DEFAULT_INTERVAL_MS;
use portflow::counters::port::UOPS_DISPATCHED_PORT;
use portflow::{report, PortMetricExporter, PortflowError, Sample, SamplerConfig};

#[derive(Parser, Debug)]
#[command(name = "portflow")]
#[command(about = "Per-core execution port utilization from hardware performance counters")]
struct Args {
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS, help = "Sampling interval in milliseconds")]
    interval_ms: u64,

    #[arg(long, default_value = "/proc/cpuinfo", help = "CPU description to read topology from")]
    cpuinfo: PathBuf,

    #[arg(long, help = "Stop after this many samples (default: run until interrupted)")]
    ticks: Option<u64>,

    #[arg(long, help = "Serve Prometheus metrics on this address, e.g. 0.0.0.0:8080")]
    listen: Option<SocketAddr>,

    #[arg(
        short,
        long,
        help = "Enable verbose logging (shows all MSR read/write operations)"
    )]
    verbose: bool,
}

async fn metrics_handler(
    axum::extract::State(exporter): axum::extract::State<Arc<PortMetricExporter>>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    let metric_families = exporter.registry().gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode port metrics: {}", e);
    }

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

fn check_permissions() {
    let msr_path = portflow_raw::msr::device_path(0);
    if std::fs::metadata(&msr_path).is_err() {
        tracing::warn!(
            "Cannot access {}: the MSR kernel module may not be loaded (run: sudo modprobe msr)",
            msr_path.display()
        );
    }

    if !nix::unistd::geteuid().is_root() {
        tracing::warn!("Not running as root; opening MSR devices requires CAP_SYS_RAWIO");
    }
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::warn!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::warn!("Shutdown triggered by SIGTERM");
        },
        _ = cancel_token.cancelled() => return,
    }

    cancel_token.cancel();
}

fn start_exporter(
    addr: SocketAddr,
    exporter: Arc<PortMetricExporter>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(exporter);

    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
                return;
            }
        };
        tracing::info!("Serving Prometheus metrics on http://{}/metrics", addr);

        let shutdown = async move { cancel_token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!("Metrics server failed: {}", e);
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SamplerConfig::new(args.interval_ms, args.cpuinfo, args.ticks, args.listen)?;

    check_permissions();

    let cpuinfo_path = config.cpuinfo_path.clone();
    let mut sampler = match portflow::bootstrap(
        HostPlatform,
        || Topology::discover(&cpuinfo_path),
        msr::open,
    ) {
        Ok(sampler) => sampler,
        Err(e @ PortflowError::UnsupportedHardware(_)) => {
            tracing::error!("Sorry, your CPU is not supported yet: {}", e);
            return Err(e).context("capability check failed");
        }
        Err(e @ PortflowError::MissingFeature(_)) => {
            tracing::error!("Cannot calculate core utilization: {}", e);
            return Err(e).context("required CPU feature missing");
        }
        Err(e) => return Err(e).context("failed to initialize port counters"),
    };

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let exporter = match config.listen {
        Some(_) => Some(Arc::new(PortMetricExporter::new(
            &sampler.monitor().core_ids(),
            UOPS_DISPATCHED_PORT,
        )?)),
        None => None,
    };
    let server = match (config.listen, &exporter) {
        (Some(addr), Some(exporter)) => Some(start_exporter(
            addr,
            Arc::clone(exporter),
            cancel_token.clone(),
        )),
        _ => None,
    };

    let stdout = std::io::stdout();
    let result = sampler
        .run(
            config.interval,
            config.max_ticks,
            cancel_token.clone(),
            |sample: &Sample| {
                let mut out = stdout.lock();
                writeln!(out, "{}", report::format_line(sample))?;
                out.flush()?;
                if let Some(exporter) = &exporter {
                    exporter.observe(sample);
                }
                Ok(())
            },
        )
        .await;

    cancel_token.cancel();
    if let Some(handle) = server {
        let _ = handle.await;
    }
    drop(sampler);

    let ticks = result.context("sampling failed")?;
    tracing::info!("Stopped after {} ticks", ticks);

    Ok(())
}
