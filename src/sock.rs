use std::io::Read;
use std::os::fd::AsFd;

use log::debug;

/// Set TCP NODELAY.
///
/// Set on the listening socket; accepted sockets inherit it.
///
/// # Errors
///
/// System setsockopt errors.
pub fn set_nodelay<F: AsFd>(sock: &F) -> anyhow::Result<()> {
    nix::sys::socket::setsockopt(sock, nix::sys::socket::sockopt::TcpNoDelay, &true)?;
    Ok(())
}

/// Read and discard until the peer closes.
///
/// After the write half is shut down, anything the peer still sends has
/// to be consumed, or the peer's later writes can turn our close into a
/// reset on some platforms. Read errors end the drain like EOF.
pub fn drain<R: Read>(conn: &mut R) {
    let mut buf = [0u8; 32 * 1024];
    loop {
        match conn.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) => {
                debug!("Error draining peer input: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_consumes_to_eof() {
        let mut input = std::io::Cursor::new(vec![1u8; 100_000]);
        drain(&mut input);
        assert_eq!(input.position(), 100_000);
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("connection reset"))
        }
    }

    #[test]
    fn drain_treats_errors_as_eof() {
        drain(&mut Broken {});
    }
}
