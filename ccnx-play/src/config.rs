//! Command line on top of the access config (file + env, see ccnx_access::config).

use std::path::PathBuf;

use anyhow::{bail, Context};
use ccnx_access::AccessConfig;

use crate::location;

/// Default number of consecutive empty pulls before giving up.
pub const DEFAULT_MAX_EMPTY_PULLS: u32 = 16;

#[derive(Debug, Clone)]
pub struct PlayOptions {
    /// File path inside the CCNx namespace.
    pub path: String,
    pub access: AccessConfig,
    /// None: stdout.
    pub output: Option<PathBuf>,
    pub seek: u64,
    pub max_empty_pulls: u32,
}

#[derive(Debug)]
pub enum Command {
    Version,
    Help,
    Play(PlayOptions),
}

pub const USAGE: &str = "usage: ccnx-play [--forwarder ADDR] [--output FILE] [--seek OFFSET] \
[--max-empty-pulls N] [--timeout-ms MS] [--no-seek] <ccnx1.0://path/to/file>";

/// Parse arguments (without argv[0]) over `access`.
pub fn parse_args<I>(args: I, mut access: AccessConfig) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut url = None;
    let mut output = None;
    let mut seek = 0u64;
    let mut max_empty_pulls = DEFAULT_MAX_EMPTY_PULLS;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--forwarder" => access.forwarder = value(&mut args, &arg)?,
            "--output" | "-o" => output = Some(PathBuf::from(value(&mut args, &arg)?)),
            "--seek" => {
                seek = value(&mut args, &arg)?
                    .parse()
                    .context("--seek expects a byte offset")?
            }
            "--max-empty-pulls" => {
                max_empty_pulls = value(&mut args, &arg)?
                    .parse()
                    .context("--max-empty-pulls expects a count")?
            }
            "--timeout-ms" => {
                access.timeout_ms = Some(
                    value(&mut args, &arg)?
                        .parse()
                        .context("--timeout-ms expects milliseconds")?,
                )
            }
            "--no-seek" => access.seekable = false,
            s if s.starts_with('-') => bail!("unknown option {}\n{}", s, USAGE),
            _ => {
                if url.replace(arg).is_some() {
                    bail!("more than one location given\n{}", USAGE);
                }
            }
        }
    }
    let Some(url) = url else {
        bail!("missing location\n{}", USAGE);
    };
    let path = location::parse(&url)?;
    access.validate()?;
    Ok(Command::Play(PlayOptions {
        path,
        access,
        output,
        seek,
        max_empty_pulls,
    }))
}

fn value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> anyhow::Result<String> {
    args.next()
        .with_context(|| format!("{} expects a value", flag))
}
