//! LogSink and VarProvider implementations used by the CLI

use convoy_core::domain::log::LogLevel;
use convoy_lua::{LogSink, MapVarProvider, VarProvider};
use tracing::{debug, error, info, warn};

/// Forwards `log.*` calls from definition scripts to `tracing`
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn write(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "convoy::script", "{}", message),
            LogLevel::Info => info!(target: "convoy::script", "{}", message),
            LogLevel::Warning => warn!(target: "convoy::script", "{}", message),
            LogLevel::Error => error!(target: "convoy::script", "{}", message),
        }
    }
}

/// Resolves unknown variables to a placeholder so a definition can be
/// validated without its secrets
pub struct PlaceholderVarProvider {
    known: MapVarProvider,
}

impl PlaceholderVarProvider {
    pub fn new(known: MapVarProvider) -> Self {
        Self { known }
    }
}

impl VarProvider for PlaceholderVarProvider {
    fn get(&self, name: &str) -> Option<String> {
        Some(
            self.known
                .get(name)
                .unwrap_or_else(|| format!("<{}>", name)),
        )
    }

    fn keys(&self) -> Vec<String> {
        self.known.keys()
    }
}
