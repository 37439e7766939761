//! Group definition parser
//!
//! Evaluates a definition script in the sandbox and turns the returned table
//! into validated [`Job`]s. A script returns either a group:
//!
//! ```lua
//! return group.define({
//!     name = "ci",
//!     mode = "concurrent",
//!     jobs = { lint, test },
//! })
//! ```
//!
//! or a single job table, which becomes a sequential group of one.

use anyhow::{Context, Result};
use convoy_core::{ExecutionMode, GroupError, Job, JobGroup};
use mlua::{Table, Value};
use tracing::debug;

use crate::module::ModuleRegistry;
use crate::sandbox::create_sandbox;

const DEFAULT_GROUP_NAME: &str = "default";

/// Parsed, validated group contents, not yet registered into a [`JobGroup`]
#[derive(Debug, Clone)]
pub struct GroupDefinition {
    pub name: String,
    pub mode: ExecutionMode,
    pub jobs: Vec<Job>,
}

impl GroupDefinition {
    /// Registers every job into a new group, in definition order
    ///
    /// # Errors
    /// [`GroupError::DuplicateName`] if two jobs share a name
    pub fn into_group(self) -> Result<JobGroup, GroupError> {
        let mut group = JobGroup::new(self.name, self.mode);
        for job in self.jobs {
            group.add(job)?;
        }
        Ok(group)
    }
}

/// Parse a group definition from Lua source code
///
/// The modules in `registry` (typically `env` and `log`) are registered into
/// the sandbox before the script runs.
///
/// # Errors
/// Returns an error if:
/// - The Lua source is invalid or raises an error
/// - The script does not return a table
/// - A job is missing required fields or fails validation
/// - The mode is not a known execution mode
pub fn parse_group_definition(source: &str, registry: &ModuleRegistry) -> Result<GroupDefinition> {
    let lua = create_sandbox().context("Failed to create Lua sandbox")?;
    registry
        .register_all(&lua)
        .context("Failed to register modules into sandbox")?;

    let definition: Table = lua
        .load(source)
        .set_name("definition")
        .eval()
        .context("Failed to evaluate group definition")?;

    if definition.contains_key("jobs")? {
        parse_group(&definition)
    } else {
        let job = parse_job(&definition).context("Failed to parse job definition")?;
        debug!("Definition returned a single job '{}'", job.name());
        Ok(GroupDefinition {
            name: job.name().to_string(),
            mode: ExecutionMode::Sequential,
            jobs: vec![job],
        })
    }
}

fn parse_group(definition: &Table) -> Result<GroupDefinition> {
    let name: String = definition
        .get::<Option<String>>("name")
        .context("Field 'name' must be a string")?
        .unwrap_or_else(|| DEFAULT_GROUP_NAME.to_string());

    let mode = match definition
        .get::<Option<String>>("mode")
        .context("Field 'mode' must be a string")?
    {
        Some(mode) => mode.parse::<ExecutionMode>().map_err(anyhow::Error::msg)?,
        None => ExecutionMode::default(),
    };

    let jobs_table: Table = definition
        .get("jobs")
        .context("Field 'jobs' must be an array of job tables")?;

    let mut jobs = Vec::new();
    for (idx, entry) in jobs_table.sequence_values::<Table>().enumerate() {
        let job_table = entry.context(format!("Job entry {} is not a table", idx + 1))?;
        let job = parse_job(&job_table).context(format!("Invalid job at position {}", idx + 1))?;
        jobs.push(job);
    }

    if jobs.is_empty() {
        anyhow::bail!("Group '{}' must have at least one job", name);
    }

    debug!(
        "Parsed group '{}' ({} mode, {} job(s))",
        name,
        mode,
        jobs.len()
    );

    Ok(GroupDefinition { name, mode, jobs })
}

fn parse_job(table: &Table) -> Result<Job> {
    let name: String = table
        .get("name")
        .context("Job must have a 'name' field")?;

    let mut builder = Job::builder(name.as_str());

    if let Some(image) = table
        .get::<Option<String>>("image")
        .context(format!("Job '{}': 'image' must be a string", name))?
    {
        builder = builder.image(image);
    }

    if let Some(path) = table
        .get::<Option<String>>("mount_path")
        .context(format!("Job '{}': 'mount_path' must be a string", name))?
    {
        builder = builder.mount_path(path);
    }

    let privileged = table
        .get::<Option<bool>>("privileged")
        .context(format!("Job '{}': 'privileged' must be a boolean", name))?
        .unwrap_or(false);
    builder = builder.privileged(privileged);

    match table.get::<Value>("env")? {
        Value::Nil => {}
        Value::Table(env) => {
            for pair in env.pairs::<Value, Value>() {
                let (key, value) = pair?;
                let key = match key {
                    Value::String(key) => key
                        .to_str()
                        .map(|k| k.to_string())
                        .context(format!("Job '{}': env keys must be valid UTF-8", name))?,
                    _ => anyhow::bail!("Job '{}': env keys must be strings", name),
                };
                let value = env_value_to_string(&value).with_context(|| {
                    format!("Job '{}': env value for '{}' must be a string", name, key)
                })?;
                builder = builder.env(key, value);
            }
        }
        _ => anyhow::bail!("Job '{}': 'env' must be a table", name),
    }

    match table.get::<Value>("tasks")? {
        Value::Nil => {}
        Value::Table(tasks) => {
            for task in tasks.sequence_values::<String>() {
                let task = task.context(format!("Job '{}': tasks must be strings", name))?;
                builder = builder.task(task);
            }
        }
        _ => anyhow::bail!("Job '{}': 'tasks' must be an array of strings", name),
    }

    Ok(builder.build()?)
}

/// Numbers and booleans are accepted and rendered the way a shell would see them
fn env_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => s.to_str().ok().map(|s| s.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{EnvModule, MapVarProvider};

    fn registry_with(vars: &[(&str, &str)]) -> ModuleRegistry {
        let provider: MapVarProvider = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut registry = ModuleRegistry::new();
        registry.register(EnvModule::new(provider)).unwrap();
        registry
    }

    #[test]
    fn test_parse_single_job_script() {
        let source = r#"
            local gopath = "/go"
            local local_path = gopath .. "/src/github.com/Azure/draft"

            local go_build = job.define({
                name = "draft-test",
                image = "golang:1.8",
                mount_path = local_path,
                env = {
                    DEST_PATH = local_path,
                    GOPATH = gopath,
                    CODECOV_TOKEN = env.require("CODECOV_TOKEN"),
                },
                tasks = {
                    "cd $DEST_PATH",
                    "make bootstrap",
                    "make build",
                    "make test",
                },
            })

            return go_build
        "#;

        let def = parse_group_definition(source, &registry_with(&[("CODECOV_TOKEN", "abc")]))
            .unwrap();

        assert_eq!(def.name, "draft-test");
        assert_eq!(def.mode, ExecutionMode::Sequential);
        assert_eq!(def.jobs.len(), 1);

        let job = &def.jobs[0];
        assert_eq!(job.image(), "golang:1.8");
        assert_eq!(job.mount_path(), Some("/go/src/github.com/Azure/draft"));
        assert_eq!(job.env()["CODECOV_TOKEN"], "abc");
        assert_eq!(job.env()["GOPATH"], "/go");
        assert_eq!(job.tasks().len(), 4);
    }

    #[test]
    fn test_parse_concurrent_group() {
        let source = r#"
            local lint = job.builder("lint"):image("alpine"):task("make lint"):build()
            local test = job.builder("test"):image("alpine"):task("make test"):build()
            local docker = job.builder("docker")
                :image("docker:dind")
                :privileged()
                :env("REGISTRY", "docker.io")
                :task("docker build .")
                :build()

            return group.define({
                name = "ci",
                mode = "concurrent",
                jobs = { lint, test, docker },
            })
        "#;

        let def = parse_group_definition(source, &ModuleRegistry::new()).unwrap();
        assert_eq!(def.name, "ci");
        assert_eq!(def.mode, ExecutionMode::Concurrent);

        let names: Vec<&str> = def.jobs.iter().map(|j| j.name()).collect();
        assert_eq!(names, vec!["lint", "test", "docker"]);
        assert!(def.jobs[2].privileged());
        assert!(!def.jobs[0].privileged());

        let group = def.into_group().unwrap();
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn test_parse_env_numbers_and_default_mode() {
        let source = r#"
            return {
                jobs = {
                    { name = "a", image = "alpine", env = { RETRIES = 3, DEBUG = true }, tasks = { "true" } },
                },
            }
        "#;

        let def = parse_group_definition(source, &ModuleRegistry::new()).unwrap();
        assert_eq!(def.name, "default");
        assert_eq!(def.mode, ExecutionMode::Sequential);
        assert_eq!(def.jobs[0].env()["RETRIES"], "3");
        assert_eq!(def.jobs[0].env()["DEBUG"], "true");
    }

    #[test]
    fn test_duplicate_names_fail_on_registration() {
        let source = r#"
            return {
                jobs = {
                    { name = "test", image = "alpine", tasks = { "true" } },
                    { name = "test", image = "golang", tasks = { "true" } },
                },
            }
        "#;

        let def = parse_group_definition(source, &ModuleRegistry::new()).unwrap();
        let err = def.into_group().unwrap_err();
        assert!(matches!(err, GroupError::DuplicateName { .. }));
    }

    #[test]
    fn test_parse_errors() {
        let registry = ModuleRegistry::new();

        let missing_image = r#"return { name = "x", tasks = { "true" } }"#;
        let err = parse_group_definition(missing_image, &registry).unwrap_err();
        assert!(format!("{:#}", err).contains("no image"));

        let bad_mode = r#"return { mode = "background", jobs = { { name = "x", image = "a", tasks = { "t" } } } }"#;
        let err = parse_group_definition(bad_mode, &registry).unwrap_err();
        assert!(err.to_string().contains("unknown execution mode"));

        let empty = r#"return { jobs = {} }"#;
        let err = parse_group_definition(empty, &registry).unwrap_err();
        assert!(err.to_string().contains("at least one job"));

        let not_table = r#"return "nope""#;
        assert!(parse_group_definition(not_table, &registry).is_err());

        let invalid = "this is not lua!!!";
        assert!(parse_group_definition(invalid, &registry).is_err());
    }

    #[test]
    fn test_env_array_is_rejected() {
        let source = r#"
            return { name = "x", image = "alpine", env = { "FOO=bar" }, tasks = { "true" } }
        "#;

        let err = parse_group_definition(source, &ModuleRegistry::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("env keys must be strings"));
    }

    #[test]
    fn test_missing_required_variable() {
        let source = r#"
            return { name = "x", image = "alpine", env = { T = env.require("TOKEN") }, tasks = { "true" } }
        "#;

        let err = parse_group_definition(source, &registry_with(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("Required variable 'TOKEN'"));
    }
}
