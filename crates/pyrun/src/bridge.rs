//! Scoped redirect of the interpreter's internal debug prints.
//!
//! Interpreter runtimes print diagnostics of their own (package loader
//! chatter, deprecation notices) through a single process-wide channel.
//! While a run is in progress those prints belong to that run's
//! [`Logger`] at `debug` level; outside of a run they go to `tracing`.
//!
//! Holding a [`Redirect`] is also the critical section for a run: only one
//! redirect can be live per bridge, so runs sharing a bridge are serialized.

use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tokio::sync::{Mutex, MutexGuard};

use crate::logging::{LogLevel, Logger};

/// Routes interpreter debug prints to the logger of the active run.
pub struct LogBridge {
    lock: Mutex<()>,
    sink: RwLock<Option<Arc<dyn Logger>>>,
}

impl fmt::Debug for LogBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBridge")
            .field("redirected", &self.is_redirected())
            .finish_non_exhaustive()
    }
}

impl Default for LogBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBridge {
    /// Create a bridge with no active redirect.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            sink: RwLock::new(None),
        }
    }

    /// The process-wide bridge used by runners that weren't given their own.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<LogBridge>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Redirect debug prints to `logger` until the returned guard is dropped.
    ///
    /// Waits for any other live redirect on this bridge to be released first.
    pub async fn redirect(&self, logger: Arc<dyn Logger>) -> Redirect<'_> {
        let permit = self.lock.lock().await;
        let previous = self.replace(Some(logger));
        tracing::trace!("debug prints redirected");
        Redirect {
            bridge: self,
            previous,
            _permit: permit,
        }
    }

    /// Deliver one debug print from the interpreter.
    pub fn print(&self, message: &str) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(logger) => logger.log(LogLevel::Debug, message),
            None => tracing::debug!(target: "pyrun::interpreter", "{message}"),
        }
    }

    /// Whether a redirect is currently live.
    #[must_use]
    pub fn is_redirected(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn replace(&self, logger: Option<Arc<dyn Logger>>) -> Option<Arc<dyn Logger>> {
        let mut sink = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *sink, logger)
    }
}

/// A live redirect. Restores the previous print behavior when dropped.
pub struct Redirect<'a> {
    bridge: &'a LogBridge,
    previous: Option<Arc<dyn Logger>>,
    _permit: MutexGuard<'a, ()>,
}

impl fmt::Debug for Redirect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redirect").finish_non_exhaustive()
    }
}

impl Drop for Redirect<'_> {
    fn drop(&mut self) {
        self.bridge.replace(self.previous.take());
        tracing::trace!("debug prints restored");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;

    fn recording_logger() -> (Arc<dyn Logger>, Arc<StdMutex<Vec<(LogLevel, String)>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let logger: Arc<dyn Logger> = Arc::new(move |level: LogLevel, message: &str| {
            sink.lock().unwrap().push((level, message.to_string()));
        });
        (logger, seen)
    }

    #[tokio::test]
    async fn test_prints_go_to_logger_while_redirected() {
        let bridge = LogBridge::new();
        let (logger, seen) = recording_logger();

        {
            let _redirect = bridge.redirect(logger).await;
            assert!(bridge.is_redirected());
            bridge.print("loading micropip");
        }
        bridge.print("after");

        assert!(!bridge.is_redirected());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(LogLevel::Debug, "loading micropip".to_string())]
        );
    }

    #[tokio::test]
    async fn test_redirects_are_serialized() {
        let bridge = Arc::new(LogBridge::new());
        let (first, _) = recording_logger();
        let (second, _) = recording_logger();

        let held = bridge.redirect(first).await;

        let contender = bridge.clone();
        let waiter = tokio::spawn(async move {
            let _redirect = contender.redirect(second).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second redirect should proceed once the first is released")
            .unwrap();
        assert!(!bridge.is_redirected());
    }

    #[test]
    fn test_global_bridge_is_shared() {
        assert!(Arc::ptr_eq(&LogBridge::global(), &LogBridge::global()));
    }
}
