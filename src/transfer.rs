//! The zero-copy transfer loop.

use std::io;
use std::os::fd::BorrowedFd;

use log::trace;

use crate::offsets::Slot;

// Largest count passed to one primitive call. Linux caps a single
// sendfile() at 0x7fff_f000 bytes and fails larger requests on some
// kernels.
const MAX_COPY: usize = 0x7fff_f000;

/// The kernel file-to-socket copy primitive.
///
/// One call may move fewer bytes than requested. That is normal, not an
/// error: the primitive reports how many bytes it moved and advances
/// `offset` accordingly, and the caller is expected to call again.
pub trait Copier {
    fn copy(
        &self,
        out: BorrowedFd,
        src: BorrowedFd,
        offset: &mut libc::off_t,
        count: usize,
    ) -> io::Result<usize>;
}

/// `sendfile(2)`: copies file bytes to the socket inside the kernel, no
/// user-space buffer round trip.
pub struct Sendfile;

impl Copier for Sendfile {
    fn copy(
        &self,
        out: BorrowedFd,
        src: BorrowedFd,
        offset: &mut libc::off_t,
        count: usize,
    ) -> io::Result<usize> {
        nix::sys::sendfile::sendfile(out, src, Some(offset), count.min(MAX_COPY))
            .map_err(io::Error::from)
    }
}

/// Drive `copier` until `len` bytes of `src` have been sent to `out`.
///
/// The cursor in `slot` holds the number of bytes already sent. It is
/// read once at entry and persisted after every call; on success it
/// equals `len`. One call may stop short whenever the kernel's per-call
/// limit or socket buffer pressure intervenes, so the engine keeps
/// calling with the remaining length until the cursor reaches `len`.
///
/// # Errors
///
/// `EINTR` and `EAGAIN` retry the iteration. A zero-byte copy with bytes
/// still remaining means the source is shorter than its cached length and
/// fails with `UnexpectedEof`. Everything else is passed through; the
/// caller treats it as fatal for this connection only.
pub fn run<C: Copier>(
    copier: &C,
    out: BorrowedFd,
    src: BorrowedFd,
    len: u64,
    slot: &Slot<'_>,
) -> io::Result<()> {
    let mut sent = slot.get();
    while sent < len {
        let mut off = libc::off_t::try_from(sent)
            .map_err(|_| io::Error::other("cursor exceeds off_t range"))?;
        let remaining = usize::try_from(len - sent).unwrap_or(usize::MAX);
        let n = match copier.copy(out, src, &mut off, remaining) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                trace!("Transient {e} after {sent} bytes");
                continue;
            }
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {sent} of {len} bytes"),
            ));
        }
        sent = u64::try_from(off).expect("primitive left a negative offset");
        slot.set(sent);
    }
    Ok(())
}
