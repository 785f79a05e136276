//! Stage graph and build plan resolution

use super::Stage;
use crate::error::{UbiqError, UbiqResult};
use std::collections::{HashMap, HashSet};

/// Meta-target that expands to every registered stage
pub const ALL_STAGES: &str = "all";

/// Ordered, de-duplicated stages to execute; prerequisites come first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    stages: Vec<String>,
}

impl BuildPlan {
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stages.iter().any(|s| s == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(String::as_str)
    }
}

/// Acyclic graph of registered stages.
///
/// Prerequisites may name stages registered later; they are checked when a
/// plan is resolved.
#[derive(Debug, Default)]
pub struct StageRegistry {
    stages: Vec<Stage>,
    index: HashMap<String, usize>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage, rejecting duplicates and anything that closes a cycle
    pub fn register(&mut self, stage: Stage) -> UbiqResult<()> {
        if stage.id == ALL_STAGES || self.index.contains_key(&stage.id) {
            return Err(UbiqError::DuplicateStage(stage.id));
        }

        if let Some(cycle) = self.find_cycle(&stage) {
            return Err(UbiqError::CyclicDependency { cycle });
        }

        self.index.insert(stage.id.clone(), self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Stage> {
        self.index.get(id).map(|&i| &self.stages[i])
    }

    /// Stages in registration order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.id.as_str())
    }

    /// Resolve requested stage ids (or [`ALL_STAGES`]) into a plan
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> UbiqResult<BuildPlan> {
        // Report unknown names before walking anything
        for id in requested {
            let id = id.as_ref();
            if id != ALL_STAGES && !self.index.contains_key(id) {
                return Err(UbiqError::UnknownStage(id.to_string()));
            }
        }

        let roots: Vec<&str> = if requested.iter().any(|id| id.as_ref() == ALL_STAGES) {
            self.ids().collect()
        } else {
            requested.iter().map(|id| id.as_ref()).collect()
        };

        let mut plan = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            self.visit(root, &mut seen, &mut plan)?;
        }
        Ok(BuildPlan { stages: plan })
    }

    fn visit(
        &self,
        id: &str,
        seen: &mut HashSet<String>,
        plan: &mut Vec<String>,
    ) -> UbiqResult<()> {
        if seen.contains(id) {
            return Ok(());
        }
        let stage = self
            .get(id)
            .ok_or_else(|| UbiqError::UnknownStage(id.to_string()))?;
        seen.insert(id.to_string());

        for prerequisite in &stage.prerequisites {
            self.visit(prerequisite, seen, plan)?;
        }
        plan.push(id.to_string());
        Ok(())
    }

    /// Depth-first search from `candidate` over the graph it would join.
    /// Returns the cycle path if one is reachable.
    fn find_cycle(&self, candidate: &Stage) -> Option<Vec<String>> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        self.dfs(candidate, &candidate.id, &mut stack, &mut done)
    }

    fn prerequisites_of<'a>(&'a self, candidate: &'a Stage, id: &str) -> Option<&'a [String]> {
        if id == candidate.id {
            Some(&candidate.prerequisites)
        } else {
            self.get(id).map(|s| s.prerequisites.as_slice())
        }
    }

    fn dfs<'a>(
        &'a self,
        candidate: &'a Stage,
        id: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|s| *s == id) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(id.to_string());
            return Some(cycle);
        }
        if done.contains(id) {
            return None;
        }

        stack.push(id);
        for prerequisite in self.prerequisites_of(candidate, id).unwrap_or_default() {
            if let Some(cycle) = self.dfs(candidate, prerequisite, stack, done) {
                return Some(cycle);
            }
        }
        stack.pop();
        done.insert(id);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::testing::stage;

    fn pipeline() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry.register(stage("bootloader", &[])).unwrap();
        registry.register(stage("kernel", &[])).unwrap();
        registry.register(stage("dtb", &["kernel"])).unwrap();
        registry.register(stage("bootscript", &[])).unwrap();
        registry.register(stage("rootfs", &[])).unwrap();
        registry
            .register(stage(
                "image",
                &["bootloader", "kernel", "dtb", "bootscript", "rootfs"],
            ))
            .unwrap();
        registry
    }

    fn assert_topological(registry: &StageRegistry, plan: &BuildPlan) {
        let position: HashMap<&str, usize> =
            plan.iter().enumerate().map(|(i, s)| (s, i)).collect();
        assert_eq!(position.len(), plan.len(), "duplicate stage in {plan:?}");
        for id in plan.iter() {
            for prerequisite in &registry.get(id).unwrap().prerequisites {
                assert!(
                    position[prerequisite.as_str()] < position[id],
                    "{prerequisite} must precede {id}"
                );
            }
        }
    }

    #[test]
    fn all_expands_in_dependency_order() {
        let registry = pipeline();
        let plan = registry.resolve(&[ALL_STAGES]).unwrap();
        assert_eq!(
            plan.stages(),
            &["bootloader", "kernel", "dtb", "bootscript", "rootfs", "image"]
        );
    }

    #[test]
    fn resolve_pulls_in_prerequisites_once() {
        let registry = pipeline();
        let plan = registry.resolve(&["image", "dtb", "kernel"]).unwrap();
        assert_eq!(plan.len(), 6);
        assert_topological(&registry, &plan);

        let plan = registry.resolve(&["dtb"]).unwrap();
        assert_eq!(plan.stages(), &["kernel", "dtb"]);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let registry = pipeline();
        let err = registry.resolve(&["kernel", "firmware"]).unwrap_err();
        assert!(matches!(err, UbiqError::UnknownStage(ref s) if s == "firmware"));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let mut registry = pipeline();
        let err = registry.register(stage("kernel", &[])).unwrap_err();
        assert!(matches!(err, UbiqError::DuplicateStage(_)));
        assert!(registry.register(stage(ALL_STAGES, &[])).is_err());
    }

    #[test]
    fn self_cycle_is_rejected() {
        let mut registry = StageRegistry::new();
        let err = registry.register(stage("loop", &["loop"])).unwrap_err();
        assert!(matches!(err, UbiqError::CyclicDependency { .. }));
        assert!(registry.get("loop").is_none());
    }

    #[test]
    fn forward_reference_cycle_is_rejected_without_adding() {
        let mut registry = StageRegistry::new();
        registry.register(stage("a", &["b"])).unwrap();
        registry.register(stage("b", &["c"])).unwrap();

        let err = registry.register(stage("c", &["a"])).unwrap_err();
        match err {
            UbiqError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["c", "a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.get("c").is_none());
        assert_eq!(registry.stages().len(), 2);
    }

    #[test]
    fn dangling_prerequisite_fails_at_resolve() {
        let mut registry = StageRegistry::new();
        registry.register(stage("image", &["rootfs"])).unwrap();
        let err = registry.resolve(&["image"]).unwrap_err();
        assert!(matches!(err, UbiqError::UnknownStage(ref s) if s == "rootfs"));
    }

    #[test]
    fn diamond_graphs_resolve_topologically() {
        // Every acyclic wiring of four nodes over a fixed order
        let names = ["w", "x", "y", "z"];
        for mask in 0u32..64 {
            let mut registry = StageRegistry::new();
            let mut bit = 0;
            for (i, name) in names.iter().enumerate() {
                let mut prerequisites = Vec::new();
                for earlier in &names[..i] {
                    if mask & (1 << bit) != 0 {
                        prerequisites.push(*earlier);
                    }
                    bit += 1;
                }
                registry.register(stage(name, &prerequisites)).unwrap();
            }
            for name in names {
                let plan = registry.resolve(&[name]).unwrap();
                assert_topological(&registry, &plan);
                assert_eq!(plan.stages().last().map(String::as_str), Some(name));
            }
            let plan = registry.resolve(&[ALL_STAGES]).unwrap();
            assert_eq!(plan.len(), names.len());
            assert_topological(&registry, &plan);
        }
    }
}
