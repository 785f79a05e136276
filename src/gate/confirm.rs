//! Pre-execution disclosure and approval
//!
//! Before anything runs, the gate lists every artifact the plan will create
//! or overwrite with its declared size estimate. `--yes` skips the question,
//! never the listing.

use crate::error::UbiqResult;
use crate::process::format_bytes;
use crate::stage::Stage;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;

/// What will happen to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactChange {
    Create,
    Overwrite,
    /// Stage is cached; the artifact is left alone
    Keep,
}

impl ArtifactChange {
    fn label(&self) -> &'static str {
        match self {
            ArtifactChange::Create => "create",
            ArtifactChange::Overwrite => "overwrite",
            ArtifactChange::Keep => "up to date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub stage: String,
    pub artifact: String,
    pub path: PathBuf,
    pub estimated_bytes: u64,
    pub change: ArtifactChange,
    pub privileged: bool,
}

/// Side effects of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub entries: Vec<SummaryEntry>,
}

impl Summary {
    /// Build from planned stages paired with whether each will run
    pub fn from_stages<'a>(stages: impl IntoIterator<Item = (&'a Stage, bool)>) -> Self {
        let mut entries = Vec::new();
        for (stage, rebuild) in stages {
            for artifact in &stage.outputs {
                let change = if !rebuild {
                    ArtifactChange::Keep
                } else if artifact.exists() {
                    ArtifactChange::Overwrite
                } else {
                    ArtifactChange::Create
                };
                entries.push(SummaryEntry {
                    stage: stage.id.clone(),
                    artifact: artifact.name.clone(),
                    path: artifact.path.clone(),
                    estimated_bytes: artifact.estimated_bytes,
                    change,
                    privileged: stage.privileged,
                });
            }
        }
        Self { entries }
    }

    /// Whether any artifact will be written
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.change != ArtifactChange::Keep)
    }

    /// Total estimated bytes that will be written
    pub fn estimated_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.change != ArtifactChange::Keep)
            .map(|e| e.estimated_bytes)
            .sum()
    }

    /// Plain-text rendering, one artifact per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:<11} {:<10} {:>10}  {}{}",
                entry.stage,
                entry.change.label(),
                format_bytes(entry.estimated_bytes as f64),
                entry.path.display(),
                if entry.privileged { "  (root)" } else { "" }
            );
        }
        let _ = write!(
            out,
            "Estimated total: {}",
            format_bytes(self.estimated_bytes() as f64)
        );
        out
    }
}

/// Presents the summary and asks the question
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Show the summary; always called, even when the question is skipped
    fn disclose(&self, title: &str, body: &str);

    /// Ask a yes/no question. End of input counts as "no".
    async fn confirm(&self, question: &str) -> UbiqResult<bool>;
}

/// Requires explicit approval of a summary unless bypassed
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationGate {
    assume_yes: bool,
}

impl ConfirmationGate {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    pub fn assume_yes(&self) -> bool {
        self.assume_yes
    }

    /// Disclose `summary` and return whether to proceed
    pub async fn approve(&self, summary: &Summary, prompter: &dyn Prompter) -> UbiqResult<bool> {
        prompter.disclose("Planned changes", &summary.render());
        if self.assume_yes {
            return Ok(true);
        }
        prompter.confirm("Proceed with the build?").await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedPrompter;
    use super::*;
    use crate::stage::testing::stage;
    use crate::stage::Artifact;
    use tempfile::TempDir;

    fn stages(dir: &TempDir) -> (Stage, Stage) {
        let kernel = stage("kernel", &[]).output(Artifact::new(
            "zImage",
            dir.path().join("zImage"),
            6 << 20,
        ));
        let rootfs = stage("rootfs", &[]).privileged().output(Artifact::new(
            "rootfs",
            dir.path().join("rootfs"),
            350 << 20,
        ));
        (kernel, rootfs)
    }

    #[test]
    fn summary_classifies_artifacts() {
        let dir = TempDir::new().unwrap();
        let (kernel, rootfs) = stages(&dir);
        std::fs::write(dir.path().join("zImage"), b"old").unwrap();

        let summary = Summary::from_stages([(&kernel, true), (&rootfs, true)]);
        assert_eq!(summary.entries[0].change, ArtifactChange::Overwrite);
        assert_eq!(summary.entries[1].change, ArtifactChange::Create);
        assert_eq!(summary.estimated_bytes(), (6 << 20) + (350 << 20));

        let rendered = summary.render();
        assert!(rendered.contains("overwrite"));
        assert!(rendered.contains("350 MiB"));
        assert!(rendered.contains("(root)"));
    }

    #[test]
    fn cached_stages_are_kept() {
        let dir = TempDir::new().unwrap();
        let (kernel, _) = stages(&dir);
        let summary = Summary::from_stages([(&kernel, false)]);
        assert!(!summary.has_changes());
        assert_eq!(summary.estimated_bytes(), 0);
    }

    #[tokio::test]
    async fn bypass_still_discloses() {
        let dir = TempDir::new().unwrap();
        let (kernel, _) = stages(&dir);
        let summary = Summary::from_stages([(&kernel, true)]);
        let prompter = ScriptedPrompter::default();

        assert!(ConfirmationGate::new(true)
            .approve(&summary, &prompter)
            .await
            .unwrap());
        assert_eq!(prompter.disclosed.lock().unwrap().len(), 1);
        assert!(prompter.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_and_end_of_input_decline() {
        let dir = TempDir::new().unwrap();
        let (kernel, _) = stages(&dir);
        let summary = Summary::from_stages([(&kernel, true)]);
        let gate = ConfirmationGate::new(false);

        let no = ScriptedPrompter::answering(&[false]);
        assert!(!gate.approve(&summary, &no).await.unwrap());

        let eof = ScriptedPrompter::default();
        assert!(!gate.approve(&summary, &eof).await.unwrap());

        let yes = ScriptedPrompter::answering(&[true]);
        assert!(gate.approve(&summary, &yes).await.unwrap());
        assert_eq!(yes.disclosed.lock().unwrap().len(), 1);
    }
}
