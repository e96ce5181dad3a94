//! Tracing support wired to a rebindable test output channel.
//!
//! Every built host owns a [`tracing::Dispatch`] whose fmt layer writes into
//! the channel's current [`TestOutput`]. The channel is an explicit
//! reference updated through `TestFixture::having_test_output`, never
//! implicit thread-local or global subscriber state, so a class-shared
//! fixture can be re-pointed at the running test's output between runs.

use std::io;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::MakeWriter;

/// Destination for fixture and host log lines.
///
/// The default sink prints through the standard test harness capture, which
/// correlates lines with the currently executing test. A memory sink records
/// lines for tests that assert on logging itself.
#[derive(Clone)]
pub struct TestOutput {
    sink: Arc<Mutex<Sink>>,
}

enum Sink {
    Stdout,
    Memory(Vec<u8>),
}

impl TestOutput {
    /// An output that prints through the test harness's captured stdout.
    pub fn stdout() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Sink::Stdout)),
        }
    }

    /// An output that records lines in memory.
    pub fn memory() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Sink::Memory(Vec::new()))),
        }
    }

    /// Everything written so far. Empty for the stdout sink.
    pub fn contents(&self) -> String {
        match &*self.sink.lock().unwrap() {
            Sink::Stdout => String::new(),
            Sink::Memory(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// The recorded output split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    fn write(&self, buf: &[u8]) {
        match &mut *self.sink.lock().unwrap() {
            Sink::Stdout => print!("{}", String::from_utf8_lossy(buf)),
            Sink::Memory(bytes) => bytes.extend_from_slice(buf),
        }
    }
}

impl Default for TestOutput {
    fn default() -> Self {
        Self::stdout()
    }
}

/// Logging settings applied when the host is built.
#[derive(Clone, Debug)]
pub struct LoggingBuilder {
    level: Level,
    include_target: bool,
}

impl LoggingBuilder {
    /// Sets the maximum level that will be emitted.
    pub fn with_level(&mut self, level: Level) -> &mut Self {
        self.level = level;
        self
    }

    /// Includes the event target (module path) in each line.
    pub fn with_target(&mut self, include_target: bool) -> &mut Self {
        self.include_target = include_target;
        self
    }
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            include_target: false,
        }
    }
}

/// The host's dispatch plus the current output channel it writes through.
pub(crate) struct LogChannel {
    current: Arc<RwLock<TestOutput>>,
    dispatch: Dispatch,
}

impl LogChannel {
    pub(crate) fn new(initial: TestOutput, settings: &LoggingBuilder) -> Self {
        let current = Arc::new(RwLock::new(initial));
        let writer = ChannelWriter {
            current: current.clone(),
        };
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(settings.level)
            .with_target(settings.include_target)
            .with_ansi(false)
            .with_writer(writer)
            .finish();

        Self {
            current,
            dispatch: Dispatch::new(subscriber),
        }
    }

    pub(crate) fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Points the channel at a different output. Takes effect for every
    /// subsequent log line, including those of an already built host.
    pub(crate) fn rebind(&self, output: TestOutput) {
        *self.current.write().unwrap() = output;
    }
}

#[derive(Clone)]
struct ChannelWriter {
    current: Arc<RwLock<TestOutput>>,
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.current.read().unwrap().write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for ChannelWriter {
    type Writer = ChannelWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
