
use std::io;
use std::sync::{Arc, Mutex};

use harness::{EMPTY_MANIFEST, context, workspace};
use quill_core::{ScriptCompiler, ScriptError};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory log sink shared with the subscriber.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8(bytes)
            .expect("utf-8 logs")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn failing_compile_logs_every_diagnostic_in_report_order() {
    let dir = workspace(EMPTY_MANIFEST);
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(Level::INFO)
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        let result = ScriptCompiler::new().compile::<i32, ()>(
            &context(dir.path(), "int a = 10 / 0;\nint a = 1;\nb"),
            (),
        );
        // Everything is in the sink by the time the error comes back.
        assert!(!buffer.lines().is_empty());
        result
    });
    let error = match result {
        Err(ScriptError::Compilation(error)) => error,
        Err(other) => panic!("expected a compilation error, got {other}"),
        Ok(_) => panic!("expected compilation to fail"),
    };

    let logged: Vec<String> = buffer
        .lines()
        .into_iter()
        .filter(|line| line.contains(" QS"))
        .collect();
    assert_eq!(logged.len(), error.diagnostics.len(), "{logged:#?}");
    for (line, diagnostic) in logged.iter().zip(&error.diagnostics) {
        assert!(line.contains(&diagnostic.to_string()), "{line}");
        let level = if diagnostic.is_error() { "ERROR" } else { "WARN" };
        assert!(line.trim_start().starts_with(level), "{line}");
    }
}

#[test]
fn successful_compile_keeps_diagnostics_below_info() {
    let dir = workspace(EMPTY_MANIFEST);
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(Level::INFO)
        .finish();

    let script = tracing::subscriber::with_default(subscriber, || {
        ScriptCompiler::new().compile::<i32, ()>(&context(dir.path(), "10 / 0"), ())
    })
    .expect("compile");
    assert_eq!(script.diagnostics()[0].code, "QS0101");
    assert!(buffer.lines().is_empty(), "{:#?}", buffer.lines());
}
