//! Build stages and their declared outputs
//!
//! A stage names its prerequisites, the artifacts it writes, the host tools
//! it invokes and whether it needs root. The work itself lives behind
//! [`StageAction`], so the registry and the orchestrator stay agnostic of
//! what a stage actually builds.

pub mod registry;

pub use registry::{BuildPlan, StageRegistry, ALL_STAGES};

use crate::error::UbiqResult;
use crate::pipeline::BuildContext;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A named output of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    /// Declared size estimate for the confirmation summary, not measured
    pub estimated_bytes: u64,
}

impl Artifact {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, estimated_bytes: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            estimated_bytes,
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// The work a stage performs
#[async_trait]
pub trait StageAction: Send + Sync {
    /// Fingerprint of the inputs this stage consumes.
    ///
    /// Must not run subprocesses: it is computed for every planned stage,
    /// including the ones that end up skipped.
    async fn fingerprint(&self, ctx: &BuildContext) -> UbiqResult<String>;

    /// Produce the stage's outputs
    async fn run(&self, ctx: &BuildContext) -> UbiqResult<()>;
}

/// One node of the build graph
#[derive(Clone)]
pub struct Stage {
    pub id: String,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub outputs: Vec<Artifact>,
    pub privileged: bool,
    /// Host commands the action invokes
    pub tools: Vec<&'static str>,
    action: Arc<dyn StageAction>,
}

impl Stage {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        action: Arc<dyn StageAction>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            prerequisites: Vec::new(),
            outputs: Vec::new(),
            privileged: false,
            tools: Vec::new(),
            action,
        }
    }

    pub fn requires<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, artifact: Artifact) -> Self {
        self.outputs.push(artifact);
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn tools(mut self, tools: &[&'static str]) -> Self {
        self.tools.extend_from_slice(tools);
        self
    }

    pub fn action(&self) -> &dyn StageAction {
        self.action.as_ref()
    }

    /// Declared outputs that are not on disk
    pub fn missing_outputs(&self) -> Vec<&Artifact> {
        self.outputs.iter().filter(|a| !a.exists()).collect()
    }

    /// Sum of the declared size estimates
    pub fn estimated_bytes(&self) -> u64 {
        self.outputs.iter().map(|a| a.estimated_bytes).sum()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("prerequisites", &self.prerequisites)
            .field("outputs", &self.outputs)
            .field("privileged", &self.privileged)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Action that does nothing, for graph tests
    pub struct Noop;

    #[async_trait]
    impl StageAction for Noop {
        async fn fingerprint(&self, _ctx: &BuildContext) -> UbiqResult<String> {
            Ok("noop".to_string())
        }

        async fn run(&self, _ctx: &BuildContext) -> UbiqResult<()> {
            Ok(())
        }
    }

    pub fn stage(id: &str, prerequisites: &[&str]) -> Stage {
        Stage::new(id, id, Arc::new(Noop)).requires(prerequisites.iter().copied())
    }
}
