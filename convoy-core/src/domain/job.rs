//! Job domain types
//!
//! A job is a named unit of work executed inside one container: an image,
//! an optional workspace mount, an environment and an ordered list of shell
//! commands. Jobs are assembled through [`JobBuilder`], which validates the
//! fields before a [`Job`] exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::JobError;

/// A validated job definition
///
/// Owned exclusively by its creator until it is added to a
/// [`JobGroup`](crate::JobGroup), which takes it by value and freezes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    name: String,
    image: String,
    mount_path: Option<String>,
    env: BTreeMap<String, String>,
    tasks: Vec<String>,
    privileged: bool,
}

impl Job {
    /// Starts building a job with the given name
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Path inside the container where the workspace is mounted
    pub fn mount_path(&self) -> Option<&str> {
        self.mount_path.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Shell commands, in execution order
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    /// Sets an environment variable, replacing any previous value
    pub fn set_env(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), JobError> {
        let key = key.into();
        validate_env_key(&key)?;
        self.env.insert(key, value.into());
        Ok(())
    }

    /// Appends a shell command to the task list
    pub fn push_task(&mut self, command: impl Into<String>) -> Result<(), JobError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(JobError::EmptyTask {
                job: self.name.clone(),
                index: self.tasks.len(),
            });
        }
        self.tasks.push(command);
        Ok(())
    }
}

/// Builder for [`Job`]
///
/// Setters never fail; all checks happen in [`JobBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct JobBuilder {
    name: String,
    image: Option<String>,
    mount_path: Option<String>,
    env: BTreeMap<String, String>,
    tasks: Vec<String>,
    privileged: bool,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Container image reference (e.g., docker.io/golang:1.8)
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn mount_path(mut self, path: impl Into<String>) -> Self {
        self.mount_path = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn task(mut self, command: impl Into<String>) -> Self {
        self.tasks.push(command.into());
        self
    }

    pub fn tasks<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Validates the collected fields and produces a [`Job`]
    pub fn build(self) -> Result<Job, JobError> {
        validate_name(&self.name)?;

        let image = match self.image {
            Some(image) if !image.trim().is_empty() => image,
            _ => return Err(JobError::MissingImage(self.name)),
        };

        if let Some(path) = &self.mount_path {
            if !path.starts_with('/') {
                return Err(JobError::RelativeMountPath {
                    job: self.name,
                    path: path.clone(),
                });
            }
        }

        for key in self.env.keys() {
            validate_env_key(key)?;
        }

        if self.tasks.is_empty() {
            return Err(JobError::NoTasks(self.name));
        }
        if let Some(index) = self.tasks.iter().position(|t| t.trim().is_empty()) {
            return Err(JobError::EmptyTask {
                job: self.name,
                index,
            });
        }

        Ok(Job {
            name: self.name,
            image,
            mount_path: self.mount_path,
            env: self.env,
            tasks: self.tasks,
            privileged: self.privileged,
        })
    }
}

/// Job names end up in container names, so they are restricted to a safe charset
fn validate_name(name: &str) -> Result<(), JobError> {
    if name.is_empty() {
        return Err(JobError::EmptyName);
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(JobError::InvalidName(name.to_string()));
    }

    Ok(())
}

fn validate_env_key(key: &str) -> Result<(), JobError> {
    if key.is_empty() || key.contains('=') || key.contains('\0') {
        return Err(JobError::InvalidEnvKey(key.to_string()));
    }
    Ok(())
}
