pub mod offsets;
pub mod payload;
pub mod sock;
pub mod transfer;

/// Render the canned response header.
///
/// One payload, one mime type, one length: the whole response prefix is
/// built once at startup and written verbatim to every connection.
#[must_use]
pub fn response_header(mime: &str, length: u64) -> String {
    format!(
        "HTTP/1.0 200 OK\r\n\
         Cache-Control: max-age=31536000\r\n\
         Expires: Thu, 31 Dec 2037 23:55:55 GMT\r\n\
         Content-Type: {mime}\r\n\
         Content-Length: {length}\r\n\
         \r\n"
    )
}

#[cfg(test)]
mod tests {
    #[test]
    fn header_is_sized_and_terminated() {
        let h = super::response_header("text/plain", 10);
        assert!(h.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(h.ends_with("\r\n\r\n"));
        assert!(h.contains("Content-Type: text/plain\r\n"));
        assert!(h.contains("Content-Length: 10\r\n"));
    }
}
