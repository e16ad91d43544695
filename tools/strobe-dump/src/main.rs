#![forbid(unsafe_code)]

//! Offline decoder for captured event streams.
//!
//! Reads the framed block stream a `WriterWorker` produces and prints one
//! line per event. Corrupt or unknown records inside a block are skipped by
//! the decoder, so a damaged capture still dumps everything recoverable.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use strobe_events::stream::read_frame;
use strobe_events::{decode_timing_block, Event, EventKind};

#[derive(Parser, Debug)]
#[command(
    name = "strobe-dump",
    about = "Decode a captured strobe event stream to text."
)]
struct Args {
    /// Stream file to decode ("-" for stdin)
    input: PathBuf,

    /// Print per-kind event counts instead of individual events
    #[arg(long, action = clap::ArgAction::SetTrue)]
    counts: bool,

    /// Annotate each event with the index of the block it came from
    #[arg(long, action = clap::ArgAction::SetTrue)]
    blocks: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let reader: Box<dyn Read> = if args.input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(&args.input)
                .with_context(|| format!("open {}", args.input.display()))?,
        )
    };
    let mut reader = BufReader::new(reader);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut block_index = 0usize;
    let mut counts = [0usize; 3];
    while let Some(payload) = read_frame(&mut reader).context("read stream frame")? {
        let events = decode_timing_block(&payload);
        tracing::debug!(
            block = block_index,
            bytes = payload.len(),
            events = events.len(),
            "decoded block"
        );
        for event in &events {
            if args.counts {
                counts[kind_slot(event.kind)] += 1;
            } else {
                print_event(&mut out, args.blocks.then_some(block_index), event)?;
            }
        }
        block_index += 1;
    }

    if args.counts {
        writeln!(out, "blocks: {block_index}")?;
        writeln!(out, "begin:  {}", counts[0])?;
        writeln!(out, "end:    {}", counts[1])?;
        writeln!(out, "marker: {}", counts[2])?;
    }
    Ok(())
}

fn kind_slot(kind: EventKind) -> usize {
    match kind {
        EventKind::Begin => 0,
        EventKind::End => 1,
        EventKind::Marker => 2,
    }
}

fn print_event(out: &mut impl Write, block: Option<usize>, event: &Event) -> io::Result<()> {
    if let Some(index) = block {
        write!(out, "[{index:4}] ")?;
    }
    write!(out, "{:>12} ", event.timestamp)?;
    match event.kind {
        EventKind::Begin => write!(out, "begin ")?,
        EventKind::End => write!(out, "end   ")?,
        EventKind::Marker => write!(out, "mark  ")?,
    }
    if let Some(handle) = event.context {
        write!(out, "ctx={handle:#018x} ")?;
    }
    if event.kind == EventKind::End {
        writeln!(out)
    } else {
        writeln!(out, "color={:#010x} {}", event.color, event.name)
    }
}
