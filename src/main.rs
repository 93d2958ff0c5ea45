// Serve one file to every TCP client that connects, over and over, using
// sendfile() so payload bytes never round-trip through user space.
//
// The request is never read before the response: whoever connects gets
// the canned header and the payload, then a half-close. One OS thread per
// connection; the only shared mutable state is the offset table.

use std::io::Write;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd};
use std::sync::Arc;

use anyhow::{Context, Error, Result};
use clap::Parser;
use log::{debug, info, warn};

use fileweb::offsets::{OffsetTable, Slot};
use fileweb::payload::Payload;
use fileweb::transfer::{self, Sendfile};
use fileweb::{response_header, sock};

// Slots allocated before the first connection. Descriptor numbers start
// near zero and are reused densely, so most processes never grow past
// this.
const INITIAL_SLOTS: usize = 64;

#[derive(Parser)]
struct Opt {
    #[arg(
        long,
        short,
        help = "Verbosity level. Can be error, warn, info, debug, or trace.",
        default_value = "info"
    )]
    verbose: String,

    #[arg(long, short, default_value = "[::]:8080", help = "Listen address.")]
    listen: String,

    #[arg(
        long,
        short,
        default_value = "text/plain",
        help = "Mime type of the payload."
    )]
    mime_type: String,

    #[arg(long, help = "Skip the page cache warmup read.")]
    no_warm: bool,

    file: String,
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    use std::str::FromStr;
    stderrlog::new()
        .module(module_path!())
        .quiet(false)
        .verbosity(
            log::LevelFilter::from_str(&opt.verbose)
                .map_err(|_| Error::msg(format!("Invalid verbosity string {:?}", opt.verbose)))?
                as usize
                - 1,
        )
        .timestamp(stderrlog::Timestamp::Millisecond)
        .init()?;

    let payload = Payload::open(&opt.file)?;
    if !opt.no_warm {
        payload.warm()?;
    }
    let header = response_header(&opt.mime_type, payload.len());

    let listener =
        TcpListener::bind(&opt.listen).with_context(|| format!("binding {}", opt.listen))?;
    // Set on the listening socket so every accepted connection inherits it.
    sock::set_nodelay(&listener)?;

    info!("Serving {} with mime type {}", opt.file, opt.mime_type);
    info!("Listening on {}", opt.listen);

    serve(&listener, header.into_bytes(), payload)
}

fn serve(listener: &TcpListener, header: Vec<u8>, payload: Payload) -> Result<()> {
    let payload = Arc::new(payload);
    let header = Arc::new(header);
    let table = Arc::new(OffsetTable::new(INITIAL_SLOTS));
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Accept failed: {e}");
                continue;
            }
        };
        debug!("Accepted {peer}");
        let payload = Arc::clone(&payload);
        let header = Arc::clone(&header);
        let table = Arc::clone(&table);
        std::thread::Builder::new()
            .name(format!("conn/{peer}"))
            .spawn(move || {
                let fd = stream.as_raw_fd();
                table.ensure_capacity(fd);
                let slot = table.slot(fd);
                if let Err(e) = serve_client(&stream, &header, &payload, &slot) {
                    info!("Error serving {peer}: {e:#}");
                }
                // The cursor must be zeroed before the descriptor can be
                // reused: a reset landing after the close could clobber a
                // successor connection already transferring on the same
                // descriptor number.
                slot.reset();
                drop(stream);
            })
            .context("spawning connection thread")?;
    }
}

/// One connection: header write, transfer, half-close, drain.
///
/// The caller resets the offset slot and closes the socket afterwards, on
/// success and error alike.
fn serve_client(
    mut stream: &TcpStream,
    header: &[u8],
    payload: &Payload,
    slot: &Slot<'_>,
) -> Result<()> {
    let wrote = stream.write(header).context("writing headers")?;
    if wrote != header.len() {
        anyhow::bail!("short header write: {wrote} of {} bytes", header.len());
    }

    transfer::run(
        &Sendfile,
        stream.as_fd(),
        payload.as_fd(),
        payload.len(),
        slot,
    )
    .context("sendfile transfer")?;

    stream
        .shutdown(Shutdown::Write)
        .context("closing write half")?;
    sock::drain(&mut stream);
    Ok(())
}
