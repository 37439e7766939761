//! Lua sandbox creation
//!
//! Definition scripts run in a VM with only the table, string, math and
//! coroutine libraries. There is no `io`, `os`, `package` or `debug`, and
//! `require`, `dofile` and `loadfile` are removed, so a script can only
//! describe jobs, never act on the host.
//!
//! Two helper tables are always present:
//! - `job`: `job.define{...}` and `job.builder(name)`
//! - `group`: `group.define{...}`
//!
//! Host modules (`env`, `log`, ...) are registered by the caller afterwards.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// Create a restricted Lua sandbox with the definition helpers installed
///
/// # Example
/// ```no_run
/// use convoy_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let job: mlua::Table = lua
///     .load(r#"
///         return job.builder("draft-test")
///             :image("golang:1.8")
///             :env("GOPATH", "/go")
///             :task("make test")
///             :build()
///     "#)
///     .eval()?;
/// let image: String = job.get("image")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;

    register_job_helpers(&lua)?;
    register_group_helpers(&lua)?;

    Ok(lua)
}

fn register_job_helpers(lua: &Lua) -> LuaResult<()> {
    let job = lua.create_table()?;

    // job.define(definition) - identity, documents intent
    job.set(
        "define",
        lua.create_function(|_, definition: Table| Ok(definition))?,
    )?;

    // job.builder(name) - fluent builder producing a job table
    job.set(
        "builder",
        lua.create_function(|lua, name: String| create_job_builder(lua, name))?,
    )?;

    lua.globals().set("job", job)?;
    Ok(())
}

fn register_group_helpers(lua: &Lua) -> LuaResult<()> {
    let group = lua.create_table()?;

    group.set(
        "define",
        lua.create_function(|_, definition: Table| Ok(definition))?,
    )?;

    lua.globals().set("group", group)?;
    Ok(())
}

/// LuaLS stubs for the `job` and `group` helpers installed by [`create_sandbox`]
pub fn helper_stubs() -> String {
    r#"---@meta

---@class JobDefinition
---@field name string Unique within its group; letters, digits, '_', '.', '-'
---@field image string Container image reference
---@field mount_path? string Absolute path where the workspace is mounted
---@field env? table<string, string> Environment variables injected into the container
---@field tasks string[] Shell commands, run in order, stopping at the first failure
---@field privileged? boolean Run the container with elevated host access

---@class GroupDefinition
---@field name? string
---@field mode? "sequential"|"concurrent"
---@field jobs JobDefinition[]

---@class JobBuilder
local JobBuilder = {}

---@param image string
---@return JobBuilder
function JobBuilder:image(image) end

---@param path string
---@return JobBuilder
function JobBuilder:mount(path) end

---@param key string
---@param value string
---@return JobBuilder
function JobBuilder:env(key, value) end

---@param command string
---@return JobBuilder
function JobBuilder:task(command) end

---@param commands string[]
---@return JobBuilder
function JobBuilder:tasks(commands) end

---@param flag? boolean defaults to true
---@return JobBuilder
function JobBuilder:privileged(flag) end

---@return JobDefinition
function JobBuilder:build() end

job = {}

---@param definition JobDefinition
---@return JobDefinition
function job.define(definition) end

---@param name string
---@return JobBuilder
function job.builder(name) end

group = {}

---@param definition GroupDefinition
---@return GroupDefinition
function group.define(definition) end
"#
    .to_string()
}

/// Returns the table stored under `key`, creating it on first use
fn child_table(lua: &Lua, parent: &Table, key: &str) -> LuaResult<Table> {
    match parent.get::<Value>(key)? {
        Value::Table(table) => Ok(table),
        _ => {
            let table = lua.create_table()?;
            parent.set(key, table.clone())?;
            Ok(table)
        }
    }
}

fn create_job_builder(lua: &Lua, name: String) -> LuaResult<Table> {
    let builder = lua.create_table()?;
    builder.set("_name", name)?;

    let methods = lua.create_table()?;

    methods.set(
        "image",
        lua.create_function(|_, (builder, image): (Table, String)| {
            builder.set("_image", image)?;
            Ok(builder)
        })?,
    )?;

    methods.set(
        "mount",
        lua.create_function(|_, (builder, path): (Table, String)| {
            builder.set("_mount_path", path)?;
            Ok(builder)
        })?,
    )?;

    methods.set(
        "privileged",
        lua.create_function(|_, (builder, flag): (Table, Option<bool>)| {
            builder.set("_privileged", flag.unwrap_or(true))?;
            Ok(builder)
        })?,
    )?;

    methods.set(
        "env",
        lua.create_function(|lua, (builder, key, value): (Table, String, String)| {
            child_table(lua, &builder, "_env")?.set(key, value)?;
            Ok(builder)
        })?,
    )?;

    methods.set(
        "task",
        lua.create_function(|lua, (builder, command): (Table, String)| {
            child_table(lua, &builder, "_tasks")?.push(command)?;
            Ok(builder)
        })?,
    )?;

    methods.set(
        "tasks",
        lua.create_function(|lua, (builder, commands): (Table, Vec<String>)| {
            let tasks = child_table(lua, &builder, "_tasks")?;
            for command in commands {
                tasks.push(command)?;
            }
            Ok(builder)
        })?,
    )?;

    // build() converts the builder into a plain job table
    methods.set(
        "build",
        lua.create_function(|lua, builder: Table| {
            let definition = lua.create_table()?;
            definition.set("name", builder.get::<String>("_name")?)?;
            definition.set("image", builder.get::<Value>("_image")?)?;
            definition.set("mount_path", builder.get::<Value>("_mount_path")?)?;
            definition.set("privileged", builder.get::<Value>("_privileged")?)?;
            definition.set("env", builder.get::<Value>("_env")?)?;
            definition.set("tasks", builder.get::<Value>("_tasks")?)?;
            Ok(definition)
        })?,
    )?;

    methods.set("__index", methods.clone())?;
    builder.set_metatable(Some(methods))?;

    Ok(builder)
}
