//! Byte-oriented I/O devices.
//!
//! The machine has one input source and one output sink. Both are modeled
//! as hardware that cannot fail: a read past the end of input, or any I/O
//! error, aborts the host process with a panic rather than surfacing as a
//! guest-visible condition.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

enum Source {
    Bytes(Cursor<Vec<u8>>),
    Reader(Box<dyn Read>),
}

impl Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Bytes(c) => c.read(buf),
            Source::Reader(r) => r.read(buf),
        }
    }

    /// Bytes left, if known without blocking.
    fn remaining(&self) -> Option<u64> {
        match self {
            Source::Bytes(c) => Some(c.get_ref().len() as u64 - c.position()),
            Source::Reader(_) => None,
        }
    }
}

/// The input device: a chain of byte sources read front to back.
///
/// Appending a source never reorders bytes already queued.
pub struct InputDevice {
    sources: VecDeque<Source>,
    consumed: u64,
}

impl InputDevice {
    /// An input device with nothing queued.
    pub fn empty() -> Self {
        Self {
            sources: VecDeque::new(),
            consumed: 0,
        }
    }

    /// An input device reading from the host's standard input.
    pub fn stdin() -> Self {
        let mut dev = Self::empty();
        dev.append_reader(io::stdin());
        dev
    }

    /// An input device holding exactly `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mut dev = Self::empty();
        dev.append_bytes(bytes);
        dev
    }

    /// Queue `bytes` after everything already queued.
    pub fn append_bytes(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.sources.push_back(Source::Bytes(Cursor::new(bytes)));
        }
    }

    /// Queue a reader after everything already queued.
    pub fn append_reader<R: Read + 'static>(&mut self, reader: R) {
        self.sources.push_back(Source::Reader(Box::new(reader)));
    }

    /// Total bytes read so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Bytes queued, or `None` if a stream of unknown length is queued.
    pub fn remaining(&self) -> Option<u64> {
        self.sources.iter().map(Source::remaining).sum()
    }

    /// Read the next byte, blocking on the current source.
    ///
    /// # Panics
    /// Panics if every source is exhausted or a source reports an error.
    pub fn read_byte(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        loop {
            let Some(source) = self.sources.front_mut() else {
                panic!(
                    "the machine has encountered an internal error: read: EOF \
                     (perhaps you were running the debugger and forgot to populate \
                     the input buffer using 'appendInput'?)"
                );
            };
            match source.read(&mut buf) {
                Ok(0) => {
                    self.sources.pop_front();
                }
                Ok(_) => {
                    self.consumed += 1;
                    return buf[0];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => panic!("the machine has encountered an internal error: read: {}", e),
            }
        }
    }
}

impl Default for InputDevice {
    fn default() -> Self {
        Self::stdin()
    }
}

impl fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDevice")
            .field("sources", &self.sources.len())
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// The output device: a byte sink flushed after every byte.
pub struct OutputDevice {
    sink: Box<dyn Write>,
    written: u64,
}

impl OutputDevice {
    /// An output device writing to `sink`.
    pub fn new<W: Write + 'static>(sink: W) -> Self {
        Self {
            sink: Box::new(sink),
            written: 0,
        }
    }

    /// An output device writing to the host's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// An output device that discards everything.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    /// Total bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write one byte.
    ///
    /// # Panics
    /// Panics if the sink reports an error.
    pub fn write_byte(&mut self, byte: u8) {
        if let Err(e) = self.sink.write_all(&[byte]).and_then(|_| self.sink.flush()) {
            panic!("the machine has encountered an internal error: write: {}", e);
        }
        self.written += 1;
    }
}

impl Default for OutputDevice {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDevice")
            .field("written", &self.written)
            .finish()
    }
}

/// A shared in-memory buffer that can back an [`OutputDevice`].
///
/// The debuggers use this to show guest output next to machine state.
#[derive(Clone, Default)]
pub struct OutputCapture {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl OutputCapture {
    /// A new, empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// An output device appending to this buffer.
    pub fn device(&self) -> OutputDevice {
        OutputDevice::new(self.clone())
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.borrow().clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    /// Discard captured bytes.
    pub fn clear(&self) {
        self.buf.borrow_mut().clear();
    }
}

impl Write for OutputCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_sources_in_order() {
        let mut dev = InputDevice::from_bytes(vec![1, 2]);
        dev.append_bytes(vec![3]);
        dev.append_reader(Cursor::new(vec![4]));

        let bytes: Vec<u8> = (0..4).map(|_| dev.read_byte()).collect();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert_eq!(dev.consumed(), 4);
    }

    #[test]
    fn test_append_after_partial_read() {
        let mut dev = InputDevice::from_bytes(b"ab".to_vec());
        assert_eq!(dev.read_byte(), b'a');
        dev.append_bytes(b"c".to_vec());
        assert_eq!(dev.read_byte(), b'b');
        assert_eq!(dev.read_byte(), b'c');
    }

    #[test]
    fn test_remaining() {
        let mut dev = InputDevice::from_bytes(vec![1, 2]);
        dev.append_bytes(vec![3]);
        assert_eq!(dev.remaining(), Some(3));
        dev.read_byte();
        dev.read_byte();
        assert_eq!(dev.remaining(), Some(1));
        dev.append_reader(Cursor::new(vec![4]));
        assert_eq!(dev.remaining(), None);
        assert_eq!(InputDevice::empty().remaining(), Some(0));
    }

    #[test]
    #[should_panic(expected = "read: EOF")]
    fn test_exhausted_input_panics() {
        let mut dev = InputDevice::from_bytes(vec![1]);
        dev.read_byte();
        dev.read_byte();
    }

    #[test]
    fn test_capture() {
        let capture = OutputCapture::new();
        let mut dev = capture.device();
        dev.write_byte(b'h');
        dev.write_byte(b'i');
        assert_eq!(capture.text(), "hi");
        assert_eq!(dev.written(), 2);
    }
}
