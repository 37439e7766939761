//! Logging module for definition scripts

use crate::module::ConvoyModule;
use convoy_core::domain::log::LogLevel;
use mlua::prelude::*;
use std::sync::Arc;

/// Destination for messages logged by a script
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// The `log` module: `log.debug`, `log.info`, `log.warning`, `log.error`
pub struct LogModule<S: LogSink> {
    sink: Arc<S>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

impl<S: LogSink + 'static> ConvoyModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warning", LogLevel::Warning),
            ("error", LogLevel::Error),
        ] {
            let sink = self.sink.clone();
            log_table.set(
                name,
                lua.create_function(move |_, msg: String| {
                    sink.write(level, &msg);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Logging while the group definition is evaluated
---@class log
log = {}

---@param msg string
function log.debug(msg) end

---@param msg string
function log.info(msg) end

---@param msg string
function log.warning(msg) end

---@param msg string
function log.error(msg) end
"#
        .to_string()
    }
}
