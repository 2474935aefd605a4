use std::io::Read;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

/// Output collected from one guest stream, bounded by `cap` bytes.
///
/// Bytes past the cap are read and discarded so the guest never blocks on a
/// full pipe.
#[derive(Debug, Default, Clone)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        let remaining = self.cap.saturating_sub(self.bytes.len());
        if chunk.len() <= remaining {
            self.bytes.extend_from_slice(chunk);
        } else {
            self.bytes.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = CappedBuffer::new(cap);
    let mut tmp = [0u8; 8192];
    loop {
        let n = reader.read(&mut tmp)?;
        if n == 0 {
            break;
        }
        buf.push(&tmp[..n]);
    }
    Ok((buf.bytes, buf.truncated))
}

/// Drains a stream on a background thread.
///
/// A grandchild that inherited the pipe can hold it open after the guest is
/// gone; `finish` therefore waits a bounded time and snapshots whatever has
/// arrived instead of joining the thread.
pub struct StreamCapture {
    shared: Arc<Mutex<CappedBuffer>>,
    done: mpsc::Receiver<()>,
}

impl StreamCapture {
    pub fn spawn<R>(name: &'static str, mut reader: R, cap: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(Mutex::new(CappedBuffer::new(cap)));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&shared);

        std::thread::spawn(move || {
            let mut tmp = [0u8; 8192];
            loop {
                match reader.read(&mut tmp) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(&tmp[..n]),
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(stream = name, %err, "read guest stream");
                        break;
                    }
                }
            }
            let _ = tx.send(());
        });

        Self { shared, done }
    }

    pub fn finish(self, wait: Duration) -> (Vec<u8>, bool) {
        let _ = self.done.recv_timeout(wait);
        let buf = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        (buf.bytes().to_vec(), buf.truncated())
    }
}

/// Decodes captured bytes, replacing invalid sequences with U+FFFD.
///
/// When the capture was cut at the byte cap, a multi-byte character split by
/// the cut is dropped rather than rendered as a replacement character.
pub fn decode_output(bytes: &[u8], truncated: bool) -> String {
    let bytes = if truncated {
        trim_partial_char(bytes)
    } else {
        bytes
    };
    String::from_utf8_lossy(bytes).into_owned()
}

fn trim_partial_char(bytes: &[u8]) -> &[u8] {
    // A UTF-8 sequence is at most four bytes; look back at most three for the
    // lead byte of an unfinished one.
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let b = bytes[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let need = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return bytes,
        };
        if need > back {
            return &bytes[..len - back];
        }
        return bytes;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_read_keeps_prefix_and_flags_truncation() {
        let data = vec![b'x'; 10_000];
        let (out, truncated) = read_to_end_capped(&data[..], 100).expect("read");
        assert_eq!(out.len(), 100);
        assert!(truncated);
    }

    #[test]
    fn capped_read_under_cap_is_untouched() {
        let (out, truncated) = read_to_end_capped(&b"hello\n"[..], 100).expect("read");
        assert_eq!(out, b"hello\n");
        assert!(!truncated);
    }

    #[test]
    fn exact_cap_is_not_truncation() {
        let (out, truncated) = read_to_end_capped(&b"abcd"[..], 4).expect("read");
        assert_eq!(out, b"abcd");
        assert!(!truncated);
    }

    #[test]
    fn stream_capture_collects_everything() {
        let cap = StreamCapture::spawn("stdout", std::io::Cursor::new(b"line\n".repeat(3)), 1024);
        let (out, truncated) = cap.finish(Duration::from_secs(5));
        assert_eq!(out, b"line\nline\nline\n");
        assert!(!truncated);
    }

    #[test]
    fn decode_replaces_invalid_bytes() {
        assert_eq!(decode_output(b"a\xffb", false), "a\u{fffd}b");
    }

    #[test]
    fn decode_drops_char_split_by_truncation() {
        // "é" is 0xC3 0xA9; the cut kept only the lead byte.
        assert_eq!(decode_output(b"caf\xc3", true), "caf");
        // A complete trailing character is kept.
        assert_eq!(decode_output("café".as_bytes(), true), "café");
        // Euro sign (3 bytes) cut after two.
        assert_eq!(decode_output(b"1\xe2\x82", true), "1");
    }

    #[test]
    fn decode_without_truncation_keeps_split_char_as_replacement() {
        assert_eq!(decode_output(b"caf\xc3", false), "caf\u{fffd}");
    }
}
