//! Top-level build driver
//!
//! ```text
//! Idle -> PlanResolved -> ConfirmationPending -> Executing -> Completed
//!                                  |                  |
//!                                  +-> Aborted        +-> Failed / Aborted
//! ```
//!
//! Stages run one at a time in plan order. Each consults the cache, then
//! the privilege gate, then runs its action and commits its cache record.
//! A failure stops the run and leaves earlier stages' artifacts in place.

use crate::cache::{CacheManager, Fingerprint};
use crate::deps::DependencyInstaller;
use crate::error::{UbiqError, UbiqResult};
use crate::gate::{ConfirmationGate, PrivilegeGate, Prompter, Summary};
use crate::pipeline::BuildContext;
use crate::stage::{BuildPlan, Stage, StageRegistry};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    PlanResolved,
    ConfirmationPending,
    Executing,
    Completed,
    Aborted,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::PlanResolved => "plan resolved",
            RunState::ConfirmationPending => "confirmation pending",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where the requested stage set came from; both feed the same planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageSelection {
    /// Positional arguments
    Cli(Vec<String>),
    /// Interactive pick-list
    Menu(Vec<String>),
}

impl StageSelection {
    pub fn stages(&self) -> &[String] {
        match self {
            StageSelection::Cli(stages) | StageSelection::Menu(stages) => stages,
        }
    }

    fn source(&self) -> &'static str {
        match self {
            StageSelection::Cli(_) => "command line",
            StageSelection::Menu(_) => "menu",
        }
    }
}

/// What a finished (non-failed) run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub state: RunState,
    pub plan: Vec<String>,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    /// Stopped at a stage boundary by Ctrl-C
    pub interrupted: bool,
}

impl RunReport {
    fn new(plan: &BuildPlan) -> Self {
        Self {
            state: RunState::PlanResolved,
            plan: plan.stages().to_vec(),
            executed: Vec::new(),
            skipped: Vec::new(),
            interrupted: false,
        }
    }
}

/// Per-stage decision made before anything runs
#[derive(Debug, Clone)]
struct Decision {
    stage: String,
    fingerprint: String,
    rebuild: bool,
}

pub struct Orchestrator {
    registry: StageRegistry,
    ctx: BuildContext,
    cache: CacheManager,
    gate: ConfirmationGate,
    privilege: PrivilegeGate,
    prompter: Arc<dyn Prompter>,
    installer: Option<DependencyInstaller>,
    stop: Arc<AtomicBool>,
    state: RunState,
}

impl Orchestrator {
    pub fn new(
        registry: StageRegistry,
        ctx: BuildContext,
        cache: CacheManager,
        gate: ConfirmationGate,
        privilege: PrivilegeGate,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            registry,
            ctx,
            cache,
            gate,
            privilege,
            prompter,
            installer: None,
            stop: Arc::new(AtomicBool::new(false)),
            state: RunState::Idle,
        }
    }

    /// Check and install host tools before executing
    pub fn with_installer(mut self, installer: DependencyInstaller) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Flag that, once set, stops the run at the next stage boundary
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Resolve, confirm and execute `selection`.
    ///
    /// Returns a report for completed and aborted runs; a failure leaves the
    /// orchestrator in `Failed` and returns the error.
    pub async fn run(&mut self, selection: &StageSelection) -> UbiqResult<RunReport> {
        self.state = RunState::Idle;
        let result = self.drive(selection).await;
        match &result {
            Ok(report) => {
                self.ctx
                    .sink()
                    .note(&format!("Run {}: {} stage(s) executed", report.state, report.executed.len()));
            }
            Err(e) => {
                self.transition(RunState::Failed);
                self.ctx.sink().note(&format!("Run failed: {}", e));
            }
        }
        result
    }

    fn transition(&mut self, next: RunState) {
        debug!("State {} -> {}", self.state, next);
        self.state = next;
    }

    fn lookup<'a>(registry: &'a StageRegistry, id: &str) -> UbiqResult<&'a Stage> {
        registry
            .get(id)
            .ok_or_else(|| UbiqError::UnknownStage(id.to_string()))
    }

    async fn drive(&mut self, selection: &StageSelection) -> UbiqResult<RunReport> {
        let plan = self.registry.resolve(selection.stages())?;
        self.transition(RunState::PlanResolved);
        info!(
            "Build plan from {}: {}",
            selection.source(),
            plan.stages().join(" -> ")
        );

        let mut report = RunReport::new(&plan);
        let decisions = self.decide(&plan).await?;

        let mut planned = Vec::with_capacity(decisions.len());
        for decision in &decisions {
            planned.push((Self::lookup(&self.registry, &decision.stage)?, decision.rebuild));
        }
        let summary = Summary::from_stages(planned);

        if !summary.has_changes() {
            self.prompter.disclose("Everything is up to date", &summary.render());
            report.skipped = report.plan.clone();
            report.state = RunState::Completed;
            self.transition(RunState::Completed);
            return Ok(report);
        }

        // No privileged stage may start unless all of them can finish
        for decision in decisions.iter().filter(|d| d.rebuild) {
            self.privilege
                .check(Self::lookup(&self.registry, &decision.stage)?)?;
        }

        if !self.gate.assume_yes() {
            self.transition(RunState::ConfirmationPending);
        }
        if !self.gate.approve(&summary, self.prompter.as_ref()).await? {
            info!("Build cancelled; nothing was changed");
            report.state = RunState::Aborted;
            self.transition(RunState::Aborted);
            return Ok(report);
        }

        self.ctx.sink().open()?;
        self.prepare_host(&decisions).await;
        self.transition(RunState::Executing);

        let total = decisions.iter().filter(|d| d.rebuild).count();
        let mut index = 0;
        for decision in &decisions {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Interrupted; stopping before stage '{}'", decision.stage);
                report.interrupted = true;
                report.state = RunState::Aborted;
                self.transition(RunState::Aborted);
                return Ok(report);
            }

            if !decision.rebuild {
                debug!("Stage '{}' is up to date", decision.stage);
                self.ctx.reporter().stage_skipped(&decision.stage);
                report.skipped.push(decision.stage.clone());
                continue;
            }

            index += 1;
            self.execute(decision, index, total)
                .await
                .map_err(|e| UbiqError::in_stage(decision.stage.as_str(), e))?;
            report.executed.push(decision.stage.clone());
        }

        report.state = RunState::Completed;
        self.transition(RunState::Completed);
        Ok(report)
    }

    /// Effective fingerprints and rebuild decisions, in plan order.
    ///
    /// A stage's effective fingerprint covers its own inputs and the
    /// effective fingerprints of its prerequisites, so a rebuilt kernel
    /// invalidates the device tree and the image as well.
    async fn decide(&self, plan: &BuildPlan) -> UbiqResult<Vec<Decision>> {
        let mut effective: HashMap<&str, String> = HashMap::new();
        let mut decisions = Vec::with_capacity(plan.len());

        for id in plan.iter() {
            let stage = Self::lookup(&self.registry, id)?;
            let own = stage.action().fingerprint(&self.ctx).await?;

            let mut fp = Fingerprint::new("stage").field("inputs", own);
            for prerequisite in &stage.prerequisites {
                let upstream = effective
                    .get(prerequisite.as_str())
                    .map(String::as_str)
                    .unwrap_or_default();
                fp = fp.field(prerequisite, upstream);
            }
            let fingerprint = fp.finish();

            let rebuild = self.cache.needs_rebuild(stage, &fingerprint);
            debug!("Stage '{}': rebuild={} ({})", id, rebuild, &fingerprint[..12]);
            effective.insert(id, fingerprint.clone());
            decisions.push(Decision {
                stage: id.to_string(),
                fingerprint,
                rebuild,
            });
        }
        Ok(decisions)
    }

    /// Install missing tools and the script environment; never fatal
    async fn prepare_host(&self, decisions: &[Decision]) {
        let Some(installer) = &self.installer else {
            return;
        };

        let mut tools: Vec<&str> = Vec::new();
        for decision in decisions.iter().filter(|d| d.rebuild) {
            if let Some(stage) = self.registry.get(&decision.stage) {
                tools.extend(stage.tools.iter().copied());
            }
        }

        let unmet = installer.ensure(&tools).await;
        if !unmet.is_empty() {
            warn!("Unmet host requirements: {}", unmet.join(", "));
        }

        let scripts = &self.ctx.config.scripts;
        match installer
            .ensure_script_env(&scripts.requirements, &scripts.venv_dir)
            .await
        {
            Ok(Some(instructions)) => warn!(
                "Python helper environment is not set up. To create it, run:\n{}",
                instructions
            ),
            Ok(None) => {}
            Err(e) => warn!("Could not prepare the Python helper environment: {}", e),
        }
    }

    async fn execute(&mut self, decision: &Decision, index: usize, total: usize) -> UbiqResult<()> {
        let stage = Self::lookup(&self.registry, &decision.stage)?;

        self.privilege.check(stage)?;
        if let Some(installer) = &self.installer {
            installer.require(&stage.id, &stage.tools)?;
        }

        let reporter = self.ctx.reporter();
        reporter.stage_started(&stage.id, &stage.description, index, total);
        self.ctx
            .sink()
            .note(&format!("Stage {} started: {}", stage.id, stage.description));

        // A half-finished run must not leave a record that still matches
        self.cache.invalidate(&stage.id).await?;

        let mut result = stage.action().run(&self.ctx).await;
        if result.is_ok() {
            result = self.cache.commit(stage, &decision.fingerprint).await;
        }

        reporter.stage_finished(&stage.id, result.is_ok());
        match &result {
            Ok(()) => {
                info!("Stage '{}' finished", stage.id);
                self.ctx.sink().note(&format!("Stage {} finished", stage.id));
            }
            Err(e) => self
                .ctx
                .sink()
                .note(&format!("Stage {} failed: {}", stage.id, e)),
        }
        result
    }
}
