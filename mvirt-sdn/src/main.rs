//! mvirt-sdn: validate controller configuration and replay recorded switch
//! events through the controller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mvirt_sdn::channel::QueueChannel;
use mvirt_sdn::config::Config;
use mvirt_sdn::connection::Session;
use mvirt_sdn::controller::Controller;
use mvirt_sdn::event::ConnectionEvent;
use mvirt_sdn::message::OutgoingMessage;
use mvirt_sdn::report::CsvReportSink;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Controller configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Write inspection reports as CSV to this file instead of stdout
    #[arg(short, long)]
    reports: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the configuration and build the handler chains, then exit
    Check,

    /// Feed recorded connection events (JSON lines) through the controller
    Replay {
        /// Event file, one JSON event per line
        #[arg(short, long)]
        events: PathBuf,

        /// Per-connection event queue depth
        #[arg(long, default_value_t = 1024)]
        queue_depth: usize,
    },
}

/// A running connection loop and the task draining its outgoing messages.
struct ReplayConnection {
    events: mpsc::Sender<ConnectionEvent>,
    session: JoinHandle<Session>,
    writer: JoinHandle<usize>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!(error = %format!("{e:#}"), "mvirt-sdn failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::Check => {
            let controller = Controller::new(config, Arc::new(CsvReportSink::new(std::io::sink())))
                .context("building controller")?;
            let config = controller.config();
            println!(
                "Configuration OK: {} allowed datapath(s), l2_switching={}, dpi={}",
                config.allow_list.len(),
                config.l2_switching,
                config.dpi_enabled
            );
            Ok(())
        }
        Command::Replay {
            events,
            queue_depth,
        } => {
            let writer = report_writer(args.reports.as_deref())?;
            let controller = Controller::new(config, Arc::new(CsvReportSink::new(writer)))
                .context("building controller")?;
            replay(&controller, &events, queue_depth.max(1)).await
        }
    }
}

fn report_writer(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating report file {}", path.display()))?;
            info!(path = %path.display(), "Writing reports");
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}

async fn replay(controller: &Controller, path: &Path, queue_depth: usize) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening event file {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut connections: HashMap<SocketAddr, ReplayConnection> = HashMap::new();
    let mut line_no = 0usize;
    let mut skipped = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let event: ConnectionEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                skipped += 1;
                continue;
            }
        };

        let remote = event.remote;
        let conn = connections
            .entry(remote)
            .or_insert_with(|| open_connection(controller, remote, queue_depth));
        if conn.events.send(event).await.is_err() {
            warn!(remote = %remote, line = line_no, "Connection loop gone, dropping event");
        }
    }

    info!(
        connections = connections.len(),
        lines = line_no,
        skipped,
        "Event file consumed, closing connections"
    );

    for (remote, conn) in connections {
        drop(conn.events);
        let session = conn.session.await.context("connection task failed")?;
        let (state, dpid) = (session.state(), session.datapath_id());
        // The session owns the channel sender; the writer ends once it is gone.
        drop(session);
        let sent = conn.writer.await.context("writer task failed")?;
        info!(
            remote = %remote,
            state = ?state,
            dpid = ?dpid,
            messages_sent = sent,
            "Connection closed"
        );
    }

    Ok(())
}

/// Start a connection loop whose outgoing messages are logged instead of
/// being written to a socket.
fn open_connection(
    controller: &Controller,
    remote: SocketAddr,
    queue_depth: usize,
) -> ReplayConnection {
    let (channel, mut outgoing) = QueueChannel::new();
    let (tx, rx) = mpsc::channel(queue_depth);

    let writer = tokio::spawn(async move {
        let mut sent = 0usize;
        while let Some(msg) = outgoing.recv().await {
            log_outgoing(remote, &msg);
            sent += 1;
        }
        sent
    });
    let session = controller.spawn_connection(remote, Arc::new(channel), rx);
    debug!(remote = %remote, "Opened replay connection");

    ReplayConnection {
        events: tx,
        session,
        writer,
    }
}

fn log_outgoing(remote: SocketAddr, msg: &OutgoingMessage) {
    match msg.as_flow_mod() {
        Some(rule) => info!(
            remote = %remote,
            table = rule.table.0,
            priority = rule.priority,
            idle_timeout = rule.idle_timeout,
            cookie = %format!("{:#x}", rule.cookie),
            matches = ?rule.matches,
            instructions = ?rule.instructions,
            "FlowMod"
        ),
        None => info!(remote = %remote, msg_type = ?msg.message_type(), "Send"),
    }
}
