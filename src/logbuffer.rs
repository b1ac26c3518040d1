//! Log buffer (§4.H).
//!
//! The source expresses this as a replaceable root handler: `start_buffer()`
//! detaches the real sink and installs a capturing one; `end_buffer(discard)`
//! either replays the capture to the real sink in order or drops it, then
//! restores normal logging. `log::set_logger` can only be called once per
//! process, so this crate installs a single [`BufferingLogger`] at startup
//! (see `main::main`) that wraps an `env_logger::Logger` as the real sink
//! and captures records into a `Vec` while buffering, replaying them through
//! that same sink on flush. The pipeline is single-threaded and never nests
//! buffering (§5), so one level of start/end is all that's needed; calling
//! either out of turn is a bug.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;
use std::sync::Mutex;

struct Captured {
    level: Level,
    target: String,
    message: String,
}

enum State {
    Passthrough,
    Buffering(Vec<Captured>),
}

/// The process-wide logger. Wraps the real `env_logger` sink and the
/// current buffering state.
pub struct BufferingLogger {
    inner: env_logger::Logger,
    state: Mutex<State>,
}

impl BufferingLogger {
    pub fn new(filter: LevelFilter) -> Self {
        let inner = env_logger::Builder::new().filter_level(filter).build();
        BufferingLogger {
            inner,
            state: Mutex::new(State::Passthrough),
        }
    }

    fn write_real(&self, level: Level, target: &str, message: &str) {
        // Re-synthesize a record: `Log` gives us no way to replay the
        // original `Record` (it borrows non-'static data), so captured
        // entries are logged as plain strings through the same sink.
        self.inner.log(
            &Record::builder()
                .level(level)
                .target(target)
                .args(format_args!("{message}"))
                .build(),
        );
    }

    /// Begin buffering. Panics if already buffering.
    pub fn start_buffer(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(
            matches!(*state, State::Passthrough),
            "start_buffer() called while already buffering"
        );
        *state = State::Buffering(Vec::new());
    }

    /// End buffering. If `discard` is false, replay captured records to the
    /// real sink in order; otherwise drop them. Panics if not buffering.
    pub fn end_buffer(&self, discard: bool) {
        let mut state = self.state.lock().unwrap();
        let captured = match std::mem::replace(&mut *state, State::Passthrough) {
            State::Buffering(records) => records,
            State::Passthrough => panic!("end_buffer() called without a matching start_buffer()"),
        };
        if !discard {
            for rec in captured {
                self.write_real(rec.level, &rec.target, &rec.message);
            }
        }
    }

    pub fn is_buffering(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Buffering(_))
    }
}

impl Log for BufferingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Buffering(records) => records.push(Captured {
                level: record.level(),
                target: record.target().to_string(),
                message: record.args().to_string(),
            }),
            State::Passthrough => {
                drop(state);
                self.inner.log(record);
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static GLOBAL: OnceCell<BufferingLogger> = OnceCell::new();

/// Install the process-wide logger at `filter`. Call once, from `main`.
pub fn init(filter: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = GLOBAL.get_or_init(|| BufferingLogger::new(filter));
    log::set_logger(logger)?;
    log::set_max_level(filter);
    Ok(())
}

/// Access the installed logger to start/end a buffering window. Panics if
/// `init` has not run.
pub fn global() -> &'static BufferingLogger {
    GLOBAL.get().expect("logbuffer::init was not called")
}
