//! Chrome Tracing span collector for job visualization.
//!
//! Records launch/resume spans into thread-local buffers with zero
//! contention; buffers are merged when workers exit and can be exported to a
//! JSON file loadable in chrome://tracing or ui.perfetto.dev. Compiled only
//! with the `profile` feature.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A single trace span in Chrome Tracing format.
#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub name: &'static str,
    pub tid: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

thread_local! {
    static SPAN_BUFFER: RefCell<Vec<SpanEvent>> = RefCell::new(Vec::with_capacity(4096));
}

lazy_static::lazy_static! {
    static ref GLOBAL_START: Instant = Instant::now();
    static ref EPOCH_START_US: u64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_micros() as u64;
    static ref ALL_BUFFERS: Mutex<Vec<Vec<SpanEvent>>> = Mutex::new(Vec::new());
}

/// Records one span into the calling thread's buffer.
pub fn record_span(name: &'static str, tid: usize, start: Instant, duration: Duration) {
    let start_us = (start.duration_since(*GLOBAL_START).as_micros() as u64) + *EPOCH_START_US;
    let duration_us = duration.as_micros() as u64;

    SPAN_BUFFER.with(|buf| {
        buf.borrow_mut().push(SpanEvent {
            name,
            tid,
            start_us,
            duration_us,
        });
    });
}

/// Moves the calling thread's buffer into the global list. Each worker does
/// this once, at exit (see [`CollectorGuard`]).
pub fn collect_local_spans() {
    SPAN_BUFFER.with(|buf| {
        let mut local = buf.borrow_mut();
        if !local.is_empty() {
            let mut global = ALL_BUFFERS.lock().unwrap();
            global.push(std::mem::take(&mut *local));
        }
    });
}

/// Exports every collected span to a Chrome Tracing JSON file.
pub fn export_to_file(path: &str) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let buffers = ALL_BUFFERS.lock().unwrap();

    write!(writer, "[\n")?;
    let mut first = true;
    for buffer in buffers.iter() {
        for event in buffer {
            if !first {
                write!(writer, ",\n")?;
            }
            first = false;

            // ph: X is a "Complete Event" (requires dur).
            write!(
                writer,
                "{{\"name\":\"{}\",\"ph\":\"X\",\"ts\":{},\"dur\":{},\"pid\":1,\"tid\":{}}}",
                event.name, event.start_us, event.duration_us, event.tid
            )?;
        }
    }
    write!(writer, "\n]\n")?;
    writer.flush()
}

/// RAII span: records from construction to drop.
pub struct SpanGuard {
    name: &'static str,
    tid: usize,
    start: Instant,
}

impl SpanGuard {
    pub fn new(name: &'static str, tid: usize) -> SpanGuard {
        SpanGuard {
            name,
            tid,
            start: Instant::now(),
        }
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        record_span(self.name, self.tid, self.start, self.start.elapsed());
    }
}

/// RAII collector: merges the thread's buffer into the global list on drop.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_local_spans();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_survive_collection_and_export() {
        {
            let _span = SpanGuard::new("test-span", 0);
            std::thread::sleep(Duration::from_millis(1));
        }
        collect_local_spans();

        let path = std::env::temp_dir().join("weft-profile-test.json");
        let path = path.to_str().unwrap().to_string();
        export_to_file(&path).expect("export");

        let contents = std::fs::read_to_string(&path).expect("read back");
        assert!(contents.contains("test-span"));
        std::fs::remove_file(&path).ok();
    }
}
