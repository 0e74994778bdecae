use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::browser::driver::PageDriver;

/// A log record awaiting mirroring into the page console.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: u8,
    pub category: String,
    pub message: String,
}

/// Mirrors session logs into the in-page console, gated by the configured
/// verbosity. Draining is single-flight: if a cycle is already running, new
/// records are only enqueued; the running cycle snapshots the queue at each
/// pass and processes that snapshot.
pub struct ConsoleMirror {
    verbose: u8,
    pending: Mutex<VecDeque<LogRecord>>,
    processing: AtomicBool,
}

impl ConsoleMirror {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            pending: Mutex::new(VecDeque::new()),
            processing: AtomicBool::new(false),
        }
    }

    /// Emit through tracing and, when verbosity admits it, queue for the
    /// in-page console.
    pub fn log(&self, level: u8, category: &str, message: &str) {
        match level {
            0 | 1 => tracing::info!(category, "{}", message),
            _ => tracing::debug!(category, "{}", message),
        }
        if self.verbose >= level && self.verbose > 0 {
            self.pending
                .lock()
                .expect("mirror lock poisoned")
                .push_back(LogRecord {
                    level,
                    category: category.to_string(),
                    message: message.to_string(),
                });
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("mirror lock poisoned").len()
    }

    /// Drain queued records into the page console. Errors per record are
    /// swallowed; a lost mirror line is not worth failing a loop over.
    pub async fn drain(&self, driver: &dyn PageDriver) {
        if self.processing.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            let snapshot: Vec<LogRecord> = {
                let mut pending = self.pending.lock().expect("mirror lock poisoned");
                pending.drain(..).collect()
            };
            if snapshot.is_empty() {
                break;
            }
            for record in snapshot {
                let line = format!("[pagepilot:{}] {}", record.category, record.message);
                let literal =
                    serde_json::to_string(&line).unwrap_or_else(|_| "\"\"".to_string());
                let script = if record.level >= 2 {
                    format!("console.debug({})", literal)
                } else {
                    format!("console.log({})", literal)
                };
                if let Err(e) = driver.evaluate(&script).await {
                    tracing::debug!(error = %e, "console mirror write failed, dropping record");
                }
            }
        }

        self.processing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_gates_the_queue() {
        let silent = ConsoleMirror::new(0);
        silent.log(1, "act", "hello");
        assert_eq!(silent.pending_count(), 0);

        let chatty = ConsoleMirror::new(2);
        chatty.log(1, "act", "hello");
        chatty.log(2, "act", "detail");
        assert_eq!(chatty.pending_count(), 2);

        let level_one = ConsoleMirror::new(1);
        level_one.log(1, "act", "hello");
        level_one.log(2, "act", "detail");
        assert_eq!(level_one.pending_count(), 1);
    }
}
