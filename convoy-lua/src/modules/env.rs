//! Variable module for definition scripts
//!
//! Secrets and configuration (tokens, passwords, account ids) reach jobs as
//! plain env entries. Scripts read them through `env.get` / `env.require` and
//! copy them into a job's environment; values are treated as opaque strings.

use crate::module::ConvoyModule;
use mlua::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of variables exposed to definition scripts
pub trait VarProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// Names of all variables the provider can resolve
    fn keys(&self) -> Vec<String>;
}

/// Variable provider backed by an in-memory map
#[derive(Debug, Clone, Default)]
pub struct MapVarProvider {
    vars: HashMap<String, String>,
}

impl MapVarProvider {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }
}

impl FromIterator<(String, String)> for MapVarProvider {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl VarProvider for MapVarProvider {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.vars.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// The `env` module
pub struct EnvModule<V: VarProvider> {
    provider: Arc<V>,
}

impl<V: VarProvider> EnvModule<V> {
    pub fn new(provider: V) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl<V: VarProvider + 'static> ConvoyModule for EnvModule<V> {
    fn id(&self) -> &'static str {
        "env"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env_table = lua.create_table()?;

        // env.get(name, default?)
        {
            let provider = self.provider.clone();
            env_table.set(
                "get",
                lua.create_function(move |_, (name, default): (String, Option<String>)| {
                    Ok(provider.get(&name).or(default))
                })?,
            )?;
        }

        // env.require(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "require",
                lua.create_function(move |_, name: String| {
                    provider.get(&name).ok_or_else(|| {
                        LuaError::RuntimeError(format!("Required variable '{}' is not set", name))
                    })
                })?,
            )?;
        }

        // env.has(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "has",
                lua.create_function(move |_, name: String| Ok(provider.get(&name).is_some()))?,
            )?;
        }

        // env.keys()
        {
            let provider = self.provider.clone();
            env_table.set(
                "keys",
                lua.create_function(move |lua, ()| lua.create_sequence_from(provider.keys()))?,
            )?;
        }

        lua.globals().set(self.id(), env_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Variables and secrets supplied when the group is run
---@class env
env = {}

---Get a variable, or `default` when it is not set
---@param name string
---@param default? string
---@return string?
function env.get(name, default) end

---Get a variable, raising an error when it is not set
---@param name string
---@return string
---
---@usage
---local token = env.require("CODECOV_TOKEN")
function env.require(name) end

---Check whether a variable is set
---@param name string
---@return boolean
function env.has(name) end

---Names of all variables, sorted
---@return string[]
function env.keys() end
"#
        .to_string()
    }
}
