//! The host pull loop: pull blocks until EOF, cancellation, or too many empty pulls.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context};
use ccnx_access::{Portal, StreamSession};

use crate::config::PlayOptions;

/// What a finished (or cancelled) run delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub bytes: u64,
    pub blocks: u64,
    pub empty_pulls: u64,
    pub end_position: u64,
    pub eof: bool,
}

/// Open the stream over TCP and play it into the configured output. Blocks the calling thread.
pub fn run(opts: PlayOptions, cancel: &AtomicBool) -> anyhow::Result<Summary> {
    let mut session = ccnx_access::open_tcp(&opts.path, &opts.access)
        .with_context(|| format!("opening {} via {}", opts.path, opts.access.forwarder))?;
    if opts.seek > 0 {
        session.seek(opts.seek);
    }
    let summary = match &opts.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            pump(&mut session, BufWriter::new(file), opts.max_empty_pulls, cancel)?
        }
        None => pump(
            &mut session,
            BufWriter::new(io::stdout().lock()),
            opts.max_empty_pulls,
            cancel,
        )?,
    };
    session.close();
    Ok(summary)
}

/// Pull until EOF. An empty pull is retried; `max_empty_pulls` in a row is an error.
pub fn pump<P: Portal, W: Write>(
    session: &mut StreamSession<P>,
    mut out: W,
    max_empty_pulls: u32,
    cancel: &AtomicBool,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    let mut empty_in_row = 0u32;
    while !cancel.load(Ordering::Relaxed) {
        match session.pull() {
            Some(block) => {
                empty_in_row = 0;
                out.write_all(&block).context("writing block")?;
                summary.bytes += block.len() as u64;
                summary.blocks += 1;
            }
            None if session.is_eof() => break,
            None => {
                empty_in_row += 1;
                summary.empty_pulls += 1;
                if empty_in_row >= max_empty_pulls {
                    out.flush().ok();
                    bail!(
                        "no data after {} pulls at position {}",
                        empty_in_row,
                        session.position()
                    );
                }
            }
        }
        if session.is_eof() {
            break;
        }
    }
    out.flush().context("flushing output")?;
    summary.end_position = session.position();
    summary.eof = session.is_eof();
    Ok(summary)
}
