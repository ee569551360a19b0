//! Publishes an image file to a castview multicast group.
//!
//! # Usage
//!
//! ```sh
//! castview-send photo.png --group 239.1.2.3 --port 5000 --repeat 0 --interval-ms 2000
//! ```
//!
//! `--repeat 0` sends until killed.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use castview::MulticastEndpoint;
use castview::net::EndpointError;
use castview::net::endpoint::{DEFAULT_CAPACITY, DEFAULT_GROUP, DEFAULT_PORT};
use castview::receiver::{Framing, FramingError};
use castview::sender::{ImageSender, SendError, SenderConfig};
use thiserror::Error;

/// Default pause between repeated sends.
const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Send(#[from] SendError),
}

struct Args {
    path: PathBuf,
    config: SenderConfig,
    interval: Duration,
    repeat: u64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("castview-send: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    castview::init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let image = std::fs::read(&args.path).map_err(|source| CliError::Read {
        path: args.path.clone(),
        source,
    })?;
    let sender = ImageSender::bind(args.config)?;

    let mut sent = 0u64;
    loop {
        let report = sender.send(&image)?;
        sent += 1;
        eprintln!(
            "castview-send: {} bytes in {} datagrams to {}",
            report.bytes, report.datagrams, args.config.endpoint
        );
        if args.repeat != 0 && sent >= args.repeat {
            return Ok(());
        }
        thread::sleep(args.interval);
    }
}

fn parse_args(args: &[String]) -> Result<Args, CliError> {
    let mut path = None;
    let mut group = DEFAULT_GROUP;
    let mut port = DEFAULT_PORT;
    let mut capacity = DEFAULT_CAPACITY;
    let mut interface = Ipv4Addr::UNSPECIFIED;
    let mut config = SenderConfig::default();
    let mut interval = Duration::from_millis(DEFAULT_INTERVAL_MS);
    let mut repeat = 1;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--group" | "-g" => group = value(args, &mut i)?,
            "--port" | "-p" => port = value(args, &mut i)?,
            "--capacity" | "-c" => capacity = value(args, &mut i)?,
            "--interface" => interface = value(args, &mut i)?,
            "--ttl" => config.ttl = value(args, &mut i)?,
            "--framing" => config.framing = value::<String>(args, &mut i)?.parse()?,
            "--interval-ms" => interval = Duration::from_millis(value(args, &mut i)?),
            "--pacing-us" => config.pacing = Duration::from_micros(value(args, &mut i)?),
            "--send-buffer" => config.send_buffer_size = Some(value(args, &mut i)?),
            "--repeat" | "-n" => repeat = value(args, &mut i)?,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => {
                return Err(CliError::Usage(format!("unknown argument: {arg}")));
            }
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => return Err(CliError::Usage(format!("unexpected argument: {arg}"))),
        }
        i += 1;
    }

    let path = path.ok_or_else(|| CliError::Usage("missing image file".to_owned()))?;
    config.endpoint = MulticastEndpoint::new(group, port, capacity)?.with_interface(interface);

    Ok(Args {
        path,
        config,
        interval,
        repeat,
    })
}

/// Consumes the value following the flag at `args[*i]`.
fn value<T>(args: &[String], i: &mut usize) -> Result<T, CliError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let flag = &args[*i];
    *i += 1;
    let raw = args
        .get(*i)
        .ok_or_else(|| CliError::Usage(format!("missing value for {flag}")))?;
    raw.parse()
        .map_err(|e| CliError::Usage(format!("invalid value {raw:?} for {flag}: {e}")))
}

fn print_usage() {
    eprintln!("Usage: castview-send <FILE> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -g, --group <ADDR>       Multicast group [default: {DEFAULT_GROUP}]");
    eprintln!("  -p, --port <PORT>        UDP port [default: {DEFAULT_PORT}]");
    eprintln!("  -c, --capacity <BYTES>   Datagram capacity [default: {DEFAULT_CAPACITY}]");
    eprintln!("      --interface <ADDR>   Outgoing interface [default: any]");
    eprintln!("      --ttl <N>            Multicast TTL [default: 1]");
    eprintln!("      --framing <MODE>     short | length [default: short]");
    eprintln!("      --interval-ms <MS>   Pause between sends [default: {DEFAULT_INTERVAL_MS}]");
    eprintln!("      --pacing-us <US>     Pause between datagrams [default: 0]");
    eprintln!("      --send-buffer <BYTES> Kernel send buffer size [default: OS]");
    eprintln!("  -n, --repeat <N>         Times to send, 0 for forever [default: 1]");
    eprintln!("  -h, --help               Print this help");
}
