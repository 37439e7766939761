use mlua::prelude::*;

/// Trait for host modules made available to definition scripts.
///
/// A module registers a global table (named after [`ConvoyModule::id`]) into
/// the sandbox and can describe itself with LuaLS stubs for editor support.
///
/// # Example
///
/// ```rust
/// use convoy_lua::ConvoyModule;
/// use mlua::prelude::*;
///
/// struct BuildInfo;
///
/// impl ConvoyModule for BuildInfo {
///     fn id(&self) -> &'static str {
///         "build"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("commit", "0a1b2c3")?;
///         lua.globals().set(self.id(), table)?;
///         Ok(())
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\n---@class build\nbuild = {}".to_string()
///     }
/// }
/// ```
pub trait ConvoyModule: Send + Sync {
    /// Global name of the module inside Lua.
    ///
    /// Must be a valid Lua identifier and unique within a registry.
    fn id(&self) -> &'static str;

    /// Registers this module's table into the Lua context.
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// LuaLS stub file content, starting with `---@meta`.
    fn stubs(&self) -> String;
}

/// Ordered set of modules, unique by id
pub struct ModuleRegistry {
    modules: Vec<Box<dyn ConvoyModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Adds a module
    ///
    /// # Errors
    /// Fails if a module with the same id is already registered
    pub fn register<M: ConvoyModule + 'static>(&mut self, module: M) -> anyhow::Result<()> {
        let id = module.id();
        if self.get(id).is_some() {
            anyhow::bail!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn ConvoyModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    pub fn modules(&self) -> &[Box<dyn ConvoyModule>] {
        &self.modules
    }

    /// Registers every module into a Lua context, stopping at the first error
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }

    /// Concatenated stubs of all modules, suitable for saving as a `.lua` file
    pub fn generate_stubs(&self) -> String {
        let mut stubs = String::new();
        for module in &self.modules {
            stubs.push_str(&module.stubs());
            stubs.push_str("\n\n");
        }
        stubs
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
