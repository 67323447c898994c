//! psample command - watch and capture sampled packets.
//!
//! Prints the packets the kernel's psample module hands to user space,
//! lists the active sampling groups, or writes the raw notifications to a
//! pcap file for Wireshark.

mod output;

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use psample::{OwnedEvent, SampleStream, Session};
use tokio_stream::StreamExt;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "psample", version, about = "Packet sampling monitor")]
struct Cli {
    /// List sampling groups and exit.
    #[arg(short = 'l', long, conflicts_with_all = ["group", "monitor", "write", "count"])]
    list_groups: bool,

    /// Only receive samples of this group.
    #[arg(short = 'g', long, value_name = "GROUP")]
    group: Option<u32>,

    /// Also print group create and delete events.
    #[arg(short = 'm', long)]
    monitor: bool,

    /// Write raw notifications to a pcap file ("-" for stdout).
    #[arg(short = 'w', long, value_name = "FILE", conflicts_with_all = ["json", "count", "monitor"])]
    write: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    json: bool,

    /// Stop after this many events.
    #[arg(short = 'c', long, value_name = "N")]
    count: Option<usize>,

    /// Show debug logs.
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let result = if cli.list_groups {
        list_groups(format)
    } else if let Some(path) = cli.write.clone() {
        capture(path, cli.group).await
    } else {
        monitor(&cli, format).await
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn list_groups(format: OutputFormat) -> anyhow::Result<()> {
    let mut session = Session::open()?;
    let groups = session.groups()?;
    session.close()?;

    let mut stdout = std::io::stdout().lock();
    output::print_groups(&mut stdout, &groups, format)?;
    Ok(())
}

async fn capture(path: PathBuf, group: Option<u32>) -> anyhow::Result<()> {
    let mut session = Session::open()?;
    if let Some(group) = group {
        session.bind_group(group)?;
    }
    session.pcap_init(&path)?;
    tracing::info!("writing samples to {}", path.display());

    // The capture loop blocks on the event socket until it fails or closes.
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        session.write_pcap_dispatch()?;
        session.close()?;
        Ok(())
    })
    .await?
}

async fn monitor(cli: &Cli, format: OutputFormat) -> anyhow::Result<()> {
    let mut session = Session::builder().config_group(cli.monitor).open()?;
    if let Some(group) = cli.group {
        session.bind_group(group)?;
    }
    let mut stream = SampleStream::new(session)?;

    let mut stdout = std::io::stdout().lock();
    let mut seen = 0usize;

    loop {
        if cli.count.is_some_and(|count| seen >= count) {
            break;
        }
        let event = tokio::select! {
            event = stream.try_next() => event?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(event) = event else {
            break;
        };
        if !wanted(&event, cli.monitor) {
            continue;
        }
        output::print_event(&mut stdout, &event, format)?;
        stdout.flush()?;
        seen += 1;
    }

    drop(stdout);
    stream.into_session().close()?;
    Ok(())
}

/// Config events are printed only when monitoring.
fn wanted(event: &OwnedEvent, monitor: bool) -> bool {
    match event {
        OwnedEvent::Sample(_) => true,
        OwnedEvent::Config(_) => monitor,
    }
}
