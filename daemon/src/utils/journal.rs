use log::debug;
use mcbot_protocol::log::{LogEvent, LogLevel};
use tokio::sync::broadcast;

const JOURNAL_CAPACITY: usize = 256;

/// User-facing log stream. Every entry is also mirrored to the `log` facade at
/// debug level under the `journal` target, since subscribers print it themselves.
#[derive(Clone)]
pub struct Journal {
    tx: broadcast::Sender<LogEvent>,
}

impl Journal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(JOURNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, level: LogLevel, worker_id: Option<&str>, message: impl Into<String>) {
        let event = LogEvent::new(level, worker_id, message);
        let worker = event.worker_id.as_deref().unwrap_or("-");
        debug!(target: "journal", "[{}] {:?}: {}", worker, level, event.message);
        // nobody listening is fine
        let _ = self.tx.send(event);
    }

    pub fn info(&self, worker_id: Option<&str>, message: impl Into<String>) {
        self.emit(LogLevel::Info, worker_id, message)
    }

    pub fn warning(&self, worker_id: Option<&str>, message: impl Into<String>) {
        self.emit(LogLevel::Warning, worker_id, message)
    }

    pub fn error(&self, worker_id: Option<&str>, message: impl Into<String>) {
        self.emit(LogLevel::Error, worker_id, message)
    }

    pub fn success(&self, worker_id: Option<&str>, message: impl Into<String>) {
        self.emit(LogLevel::Success, worker_id, message)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    #[tokio::test]
    async fn subscribers_receive_entries() {
        let journal = Journal::new();
        let mut rx = journal.subscribe();

        journal.warning(Some("MC2"), "already running");
        journal.success(None, "all done");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, LogLevel::Warning);
        assert_eq!(first.worker_id.as_deref(), Some("MC2"));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, LogLevel::Success);
        assert_eq!(second.message, "all done");
    }

    struct Capture(Mutex<Vec<(Level, String, String)>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut records) = self.0.lock() {
                records.push((
                    record.level(),
                    record.target().to_owned(),
                    record.args().to_string(),
                ));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

    #[test]
    fn mirror_stays_at_debug() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(LevelFilter::Trace);

        let journal = Journal::new();
        journal.error(Some("MC3"), "mirror check failure");
        journal.success(Some("MC3"), "mirror check success");

        let records = CAPTURE.0.lock().unwrap();
        let mirrored: Vec<_> = records
            .iter()
            .filter(|(_, _, message)| message.contains("mirror check"))
            .collect();
        assert_eq!(mirrored.len(), 2);
        for (level, target, message) in mirrored {
            assert_eq!(*level, Level::Debug);
            assert_eq!(target, "journal");
            assert!(message.starts_with("[MC3] "));
        }
    }

    #[test]
    fn emit_without_subscribers() {
        Journal::new().error(Some("MC1"), "nobody hears this");
    }
}
