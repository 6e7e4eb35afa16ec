use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, warn};

use crate::modules::{CookieVerificationProbe, IntruderProbe};
use crate::probe::Probe;

/// Builds one probe instance.
pub type ProbeFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Probe>> + Send + Sync>;

struct Registration {
    label: String,
    factory: ProbeFactory,
}

/// Ordered list of probe factories, instantiated on [`ProbeRegistry::discover`].
pub struct ProbeRegistry {
    registrations: Vec<Registration>,
}

impl ProbeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Registry holding every probe shipped with the toolbox.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("cookie_verification", || {
            Ok(Box::new(CookieVerificationProbe::new()) as Box<dyn Probe>)
        });
        registry.register("intruder", || Ok(Box::new(IntruderProbe::new()) as Box<dyn Probe>));
        registry
    }

    /// Appends a factory. `label` identifies it in diagnostics.
    pub fn register<F>(&mut self, label: impl Into<String>, factory: F)
    where
        F: Fn() -> anyhow::Result<Box<dyn Probe>> + Send + Sync + 'static,
    {
        self.registrations.push(Registration {
            label: label.into(),
            factory: Box::new(factory),
        });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Instantiates every registered probe in registration order.
    ///
    /// A factory that fails or panics is logged and skipped. When two probes
    /// share a name the first one wins and the later one is dropped.
    pub fn discover(&self) -> Vec<Arc<dyn Probe>> {
        let mut probes: Vec<Arc<dyn Probe>> = Vec::new();
        let mut names = HashSet::new();

        for reg in &self.registrations {
            let built = match panic::catch_unwind(AssertUnwindSafe(|| (reg.factory)())) {
                Ok(Ok(probe)) => probe,
                Ok(Err(e)) => {
                    error!("Failed to load probe '{}': {:#}", reg.label, e);
                    continue;
                }
                Err(_) => {
                    error!("Probe '{}' panicked while loading", reg.label);
                    continue;
                }
            };

            let name = built.name().to_string();
            if name.trim().is_empty() {
                error!("Probe '{}' has an empty name, skipping", reg.label);
                continue;
            }
            if !names.insert(name.clone()) {
                warn!(
                    "Probe '{}' from '{}' duplicates an earlier probe name, skipping",
                    name, reg.label
                );
                continue;
            }

            debug!("Loaded probe '{}'", name);
            probes.push(Arc::from(built));
        }

        probes
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::probe::{InputBundle, ProbeOutput};
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::{Mutex, OnceLock};
    use std::thread::{self, ThreadId};

    /// Keeps every log record with the thread that emitted it.
    struct CaptureLogger {
        records: Mutex<Vec<(ThreadId, Level, String)>>,
    }

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records.lock().unwrap().push((
                thread::current().id(),
                record.level(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    fn capture() -> &'static CaptureLogger {
        static LOGGER: OnceLock<CaptureLogger> = OnceLock::new();
        let logger = LOGGER.get_or_init(|| CaptureLogger {
            records: Mutex::new(Vec::new()),
        });
        if log::set_logger(logger).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
        logger
    }

    /// Error-level messages logged by the current test thread.
    fn logged_errors(logger: &CaptureLogger) -> Vec<String> {
        let me = thread::current().id();
        logger
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, level, _)| *id == me && *level == Level::Error)
            .map(|(_, _, msg)| msg.clone())
            .collect()
    }

    struct NamedProbe {
        name: &'static str,
        description: &'static str,
    }

    #[async_trait]
    impl Probe for NamedProbe {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        async fn run(&self, _inputs: &InputBundle) -> anyhow::Result<ProbeOutput> {
            Ok(ProbeOutput::new())
        }
    }

    fn named(name: &'static str, description: &'static str) -> anyhow::Result<Box<dyn Probe>> {
        Ok(Box::new(NamedProbe { name, description }))
    }

    #[test]
    fn test_builtin_order() {
        let probes = ProbeRegistry::builtin().discover();
        let names: Vec<&str> = probes.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["cookie-verification", "intruder"]);
        assert!(probes.iter().all(|p| !p.description().is_empty()));
    }

    #[test]
    fn test_broken_factory_is_skipped() {
        let logger = capture();
        let mut registry = ProbeRegistry::new();
        registry.register("alpha", || named("alpha", "a"));
        registry.register("broken", || Err(anyhow!("missing dependency")));
        registry.register("beta", || named("beta", "b"));
        registry.register("gamma", || named("gamma", "c"));

        let probes = registry.discover();
        let names: Vec<&str> = probes.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(
            logged_errors(logger),
            vec!["Failed to load probe 'broken': missing dependency".to_string()]
        );
    }

    #[test]
    fn test_panicking_factory_is_skipped() {
        let logger = capture();
        let mut registry = ProbeRegistry::new();
        registry.register("explodes", || panic!("constructor bug"));
        registry.register("alpha", || named("alpha", "a"));

        let probes = registry.discover();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].name(), "alpha");
        assert_eq!(
            logged_errors(logger),
            vec!["Probe 'explodes' panicked while loading".to_string()]
        );
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let mut registry = ProbeRegistry::new();
        registry.register("first", || named("dup", "first"));
        registry.register("second", || named("dup", "second"));
        registry.register("blank", || named("  ", "nameless"));

        let probes = registry.discover();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].description(), "first");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProbeRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.discover().is_empty());
    }
}
