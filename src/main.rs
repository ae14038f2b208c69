use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use atc_simulator::controller::{ControlRequest, ControlResponse, SimulationController};
use atc_simulator::events::TracingSink;
use atc_simulator::SimConfig;

#[derive(Parser)]
#[command(name = "atc-simulator")]
#[command(about = "Automated air-traffic-control simulation", long_about = None)]
struct Cli {
    /// Simulation duration in seconds.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Master seed for deterministic runs.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Optional JSON config overriding the compiled-in defaults.
    #[arg(short, long)]
    config: Option<String>,

    /// Address of the AVN billing collaborator, e.g. 127.0.0.1:7700.
    #[arg(short, long)]
    billing: Option<String>,

    /// Run without the interactive operator prompt.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into())),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(duration) = cli.duration {
        config.duration_secs = duration;
    }
    if let Some(seed) = cli.seed {
        config.master_seed = seed;
    }

    let controller = Arc::new(SimulationController::new(config, Arc::new(TracingSink)));
    controller.initialize().await?;

    if let Some(addr) = &cli.billing {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to reach billing collaborator at {}", addr))?;
        let (reader, writer) = stream.into_split();
        controller.attach_bridge(writer, reader).await;
        info!("[MAIN] Billing collaborator connected at {}", addr);
    }

    controller.clone().start().await;

    // Ctrl-C maps onto a stop request so workers drain cleanly.
    let (ctrlc_tx, mut ctrlc_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    if cli.headless {
        tokio::select! {
            _ = ctrlc_rx.recv() => {
                info!("[MAIN] Interrupt received");
            }
            _ = wait_for_completion(controller.clone()) => {}
        }
        controller.stop().await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = ctrlc_rx.recv() => {
                info!("[MAIN] Interrupt received");
                break;
            }
            _ = wait_for_completion(controller.clone()) => {
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let Some(request) = ControlRequest::parse(line) else {
                            warn!("[MAIN] Unknown command: {}", line);
                            continue;
                        };
                        let is_stop = request == ControlRequest::Stop;
                        render(controller.clone().control(request).await);
                        if is_stop {
                            return Ok(());
                        }
                    }
                    None => break,
                }
            }
        }
    }

    controller.stop().await;
    Ok(())
}

/// Resolve once the simulation clock runs out or stop is requested.
async fn wait_for_completion(controller: Arc<SimulationController>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(250));
    loop {
        ticker.tick().await;
        if !controller.is_running() {
            break;
        }
    }
}

fn render(response: ControlResponse) {
    match response {
        ControlResponse::Ok => println!("ok"),
        ControlResponse::Status(report) => print!("{}", report),
        ControlResponse::Avns(avns) => {
            if avns.is_empty() {
                println!("no AVNs");
            }
            for avn in avns {
                println!("{}", avn);
            }
        }
        ControlResponse::Error(message) => println!("error: {}", message),
    }
}
