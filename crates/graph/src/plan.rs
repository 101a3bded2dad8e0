//! Levelled execution plan
//!
//! Planning derives the instance dependency graph from artifact flow and
//! explicit `needs` edges, rejects invalid pipelines, and arranges the
//! instances into levels: every instance in level *n* only waits on
//! instances at levels below *n*. Instances within one level are
//! independent and may run in parallel.

use serde::Serialize;
use shipwright_errors::{Error, GraphError};
use shipwright_types::ReleaseTag;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::expand::{expand, Expansion, InstanceKind, StageInstance};
use crate::spec::PipelineSpec;

/// An expanded, validated, topologically-levelled pipeline for one release
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub pipeline: String,
    pub tag: ReleaseTag,
    /// Instance names level by level
    pub levels: Vec<Vec<String>>,
    pub instances: BTreeMap<String, StageInstance>,
    /// Instances gated off by their stage condition, recorded so the run
    /// ledger can mark them skipped
    pub gated_off: Vec<String>,
    /// Expanded artifact name to producing instance
    pub artifacts: BTreeMap<String, String>,
    /// Instance name to the instances it waits on
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl ExecutionPlan {
    /// Expand and validate a pipeline for one release tag
    ///
    /// # Errors
    ///
    /// Returns an error for any declaration defect: duplicate instance or
    /// artifact names, consumed artifacts nobody produces, hard consumption
    /// of a gated producer, unknown axes or `needs` targets, and dependency
    /// cycles.
    pub fn build(spec: &PipelineSpec, tag: &ReleaseTag) -> Result<Self, Error> {
        let expansion = expand(spec, tag)?;
        validate_needs(spec)?;

        let artifacts = collect_artifacts(&expansion)?;
        let dependencies = collect_dependencies(spec, &expansion, &artifacts)?;

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphError::Cycle {
                stages: cycle.join(" -> "),
            }
            .into());
        }

        let mut instances: BTreeMap<String, StageInstance> = BTreeMap::new();
        for instance in expansion.instances {
            instances.insert(instance.name.clone(), instance);
        }

        Ok(Self {
            pipeline: spec.name.clone(),
            tag: tag.clone(),
            levels: batch_levels(&instances, &dependencies),
            instances,
            gated_off: expansion.gated.into_iter().map(|i| i.name).collect(),
            artifacts,
            dependencies,
        })
    }

    #[must_use]
    pub fn instance(&self, name: &str) -> Option<&StageInstance> {
        self.instances.get(name)
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Distinct programs named by any enabled run instance
    ///
    /// These must all resolve before a run starts; sign instances need no
    /// external tool.
    #[must_use]
    pub fn required_tools(&self) -> BTreeSet<String> {
        self.instances
            .values()
            .filter(|instance| instance.kind == InstanceKind::Run)
            .flat_map(|instance| instance.commands.iter())
            .filter_map(|argv| argv.first().cloned())
            .collect()
    }

    /// Every instance that transitively waits on `name`
    #[must_use]
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut affected: BTreeSet<String> = BTreeSet::new();
        // Levels are topologically ordered, so one forward pass suffices
        for level in &self.levels {
            for candidate in level {
                let waits = self.dependencies.get(candidate).is_some_and(|deps| {
                    deps.iter().any(|dep| dep == name || affected.contains(dep))
                });
                if waits {
                    affected.insert(candidate.clone());
                }
            }
        }
        affected
    }
}

/// `needs` targets must name declared stages, gated or not
fn validate_needs(spec: &PipelineSpec) -> Result<(), GraphError> {
    for (stage_name, stage) in &spec.stages {
        for needed in &stage.needs {
            if !spec.stages.contains_key(needed) {
                return Err(GraphError::UnknownNeeds {
                    stage: stage_name.clone(),
                    needs: needed.clone(),
                });
            }
        }
    }
    Ok(())
}

fn collect_artifacts(expansion: &Expansion) -> Result<BTreeMap<String, String>, GraphError> {
    let mut artifacts: BTreeMap<String, String> = BTreeMap::new();
    for instance in &expansion.instances {
        for binding in &instance.produces {
            if let Some(first) = artifacts.get(&binding.name) {
                return Err(GraphError::DuplicateArtifact {
                    artifact: binding.name.clone(),
                    first: first.clone(),
                    second: instance.name.clone(),
                });
            }
            artifacts.insert(binding.name.clone(), instance.name.clone());
        }
    }
    Ok(artifacts)
}

fn collect_dependencies(
    spec: &PipelineSpec,
    expansion: &Expansion,
    artifacts: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, BTreeSet<String>>, GraphError> {
    let mut by_stage: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for instance in &expansion.instances {
        by_stage
            .entry(instance.stage.as_str())
            .or_default()
            .push(instance.name.as_str());
    }

    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for instance in &expansion.instances {
        let deps = dependencies.entry(instance.name.clone()).or_default();

        for binding in &instance.consumes {
            if let Some(producer) = artifacts.get(&binding.name) {
                deps.insert(producer.clone());
            } else if let Some(producer) = expansion.gated_artifacts.get(&binding.name) {
                return Err(GraphError::GatedDependency {
                    stage: instance.name.clone(),
                    artifact: binding.name.clone(),
                    producer: producer.clone(),
                });
            } else {
                return Err(GraphError::UnknownProducer {
                    stage: instance.name.clone(),
                    artifact: binding.name.clone(),
                });
            }
        }

        // Needing a fully gated stage is vacuous: there is nothing to wait on
        for needed in &spec.stages[&instance.stage].needs {
            if let Some(targets) = by_stage.get(needed.as_str()) {
                for target in targets {
                    deps.insert((*target).to_string());
                }
            }
        }
    }

    // Consumption typos in gated stages are still declaration errors
    for instance in &expansion.gated {
        for binding in &instance.consumes {
            if !artifacts.contains_key(&binding.name)
                && !expansion.gated_artifacts.contains_key(&binding.name)
            {
                return Err(GraphError::UnknownProducer {
                    stage: instance.name.clone(),
                    artifact: binding.name.clone(),
                });
            }
        }
    }

    Ok(dependencies)
}

fn find_cycle(dependencies: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in dependencies.keys() {
        if !visited.contains(node.as_str()) {
            if let Some(cycle) = visit(node, dependencies, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: &str,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(targets) = dependencies.get(node) {
        for target in targets {
            if rec_stack.contains(target.as_str()) {
                let start = path.iter().position(|n| n == target).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(target.clone());
                return Some(cycle);
            }
            if !visited.contains(target.as_str()) {
                if let Some(cycle) = visit(target, dependencies, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

fn batch_levels(
    instances: &BTreeMap<String, StageInstance>,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Vec<String>> {
    let mut remaining: BTreeSet<String> = instances.keys().cloned().collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let level: Vec<String> = remaining
            .iter()
            .filter(|name| {
                dependencies[*name]
                    .iter()
                    .all(|dep| !remaining.contains(dep))
            })
            .cloned()
            .collect();

        if level.is_empty() {
            // Unreachable once cycle detection has passed
            break;
        }
        for name in &level {
            remaining.remove(name);
        }
        levels.push(level);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ConditionSpec, StageSpec};

    fn run_stage(consumes: &[&str], produces: &[&str]) -> StageSpec {
        StageSpec {
            consumes: consumes.iter().map(ToString::to_string).collect(),
            produces: produces.iter().map(ToString::to_string).collect(),
            commands: vec![vec!["true".to_string()]],
            ..StageSpec::default()
        }
    }

    fn pipeline(stages: Vec<(&str, StageSpec)>) -> PipelineSpec {
        PipelineSpec {
            name: "demo".to_string(),
            axes: BTreeMap::new(),
            stages: stages
                .into_iter()
                .map(|(name, stage)| (name.to_string(), stage))
                .collect(),
        }
    }

    fn tag(s: &str) -> ReleaseTag {
        s.parse().unwrap()
    }

    #[test]
    fn test_diamond_levels() {
        let spec = pipeline(vec![
            ("fetch", run_stage(&[], &["src"])),
            ("build_a", run_stage(&["src"], &["a"])),
            ("build_b", run_stage(&["src"], &["b"])),
            ("merge", run_stage(&["a", "b"], &["dist"])),
        ]);
        let plan = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap();

        assert_eq!(plan.levels.len(), 3);
        assert_eq!(plan.levels[0], vec!["fetch"]);
        assert_eq!(plan.levels[1], vec!["build_a", "build_b"]);
        assert_eq!(plan.levels[2], vec!["merge"]);
        assert_eq!(plan.artifacts["dist"], "merge");
        assert_eq!(plan.instance_count(), 4);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let spec = pipeline(vec![
            ("alpha", run_stage(&["beta_out"], &["alpha_out"])),
            ("beta", run_stage(&["alpha_out"], &["beta_out"])),
        ]);
        let err = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cycle"));
        assert!(message.contains("alpha -> beta -> alpha"));
    }

    #[test]
    fn test_unknown_producer_is_rejected() {
        let spec = pipeline(vec![("pack", run_stage(&["missing"], &["pkg"]))]);
        let err = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnknownProducer { artifact, .. }) if artifact == "missing"
        ));
    }

    #[test]
    fn test_duplicate_artifact_is_rejected() {
        let spec = pipeline(vec![
            ("first", run_stage(&[], &["bin"])),
            ("second", run_stage(&[], &["bin"])),
        ]);
        let err = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::DuplicateArtifact { first, second, .. })
                if first == "first" && second == "second"
        ));
    }

    #[test]
    fn test_gated_consumer_of_gated_producer_is_fine() {
        let mut sign = run_stage(&["unsigned"], &["signed"]);
        sign.condition = Some(ConditionSpec::Named("stable-only".to_string()));
        let mut publish = run_stage(&["signed"], &[]);
        publish.condition = Some(ConditionSpec::Named("stable-only".to_string()));

        let spec = pipeline(vec![
            ("build", run_stage(&[], &["unsigned"])),
            ("sign", sign),
            ("publish", publish),
        ]);
        let plan = ExecutionPlan::build(&spec, &tag("3.14.0a1")).unwrap();

        assert_eq!(plan.gated_off, vec!["publish", "sign"]);
        assert_eq!(plan.levels, vec![vec!["build"]]);
    }

    #[test]
    fn test_hard_consume_of_gated_artifact_is_rejected() {
        let mut sign = run_stage(&["unsigned"], &["signed"]);
        sign.condition = Some(ConditionSpec::Named("stable-only".to_string()));

        let spec = pipeline(vec![
            ("build", run_stage(&[], &["unsigned"])),
            ("sign", sign),
            ("publish", run_stage(&["signed"], &[])),
        ]);
        let err = ExecutionPlan::build(&spec, &tag("3.14.0a1")).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::GatedDependency { stage, producer, .. })
                if stage == "publish" && producer == "sign"
        ));
    }

    #[test]
    fn test_alternative_producers_across_channels() {
        // A stable-only producer may share an artifact name with an
        // enabled one; consumers bind to whichever is live for the tag.
        let mut stable_sign = run_stage(&["unsigned"], &["bin"]);
        stable_sign.condition = Some(ConditionSpec::Named("stable-only".to_string()));

        let spec = pipeline(vec![
            ("build", run_stage(&[], &["unsigned"])),
            ("pack", run_stage(&["bin"], &["pkg"])),
            ("passthrough", run_stage(&["unsigned"], &["bin"])),
            ("stable_sign", stable_sign),
        ]);
        let plan = ExecutionPlan::build(&spec, &tag("3.14.0a1")).unwrap();

        assert_eq!(plan.artifacts["bin"], "passthrough");
        assert!(plan.dependencies["pack"].contains("passthrough"));
    }

    #[test]
    fn test_needs_orders_without_artifacts() {
        let mut smoke = run_stage(&[], &[]);
        smoke.needs = vec!["pack".to_string()];
        let spec = pipeline(vec![
            ("pack", run_stage(&[], &["pkg"])),
            ("smoke", smoke),
        ]);
        let plan = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap();

        assert_eq!(plan.levels[0], vec!["pack"]);
        assert_eq!(plan.levels[1], vec!["smoke"]);
    }

    #[test]
    fn test_needs_unknown_stage_is_rejected() {
        let mut smoke = run_stage(&[], &[]);
        smoke.needs = vec!["pak".to_string()];
        let spec = pipeline(vec![
            ("pack", run_stage(&[], &["pkg"])),
            ("smoke", smoke),
        ]);
        let err = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnknownNeeds { needs, .. }) if needs == "pak"
        ));
    }

    #[test]
    fn test_needs_gated_stage_is_vacuous() {
        let mut early = run_stage(&[], &["warmup"]);
        early.condition = Some(ConditionSpec::Named("stable-only".to_string()));
        let mut smoke = run_stage(&[], &[]);
        smoke.needs = vec!["early".to_string()];

        let spec = pipeline(vec![("early", early), ("smoke", smoke)]);
        let plan = ExecutionPlan::build(&spec, &tag("3.14.0a1")).unwrap();

        assert_eq!(plan.levels, vec![vec!["smoke"]]);
        assert!(plan.dependencies["smoke"].is_empty());
    }

    #[test]
    fn test_consumption_typo_in_gated_stage_is_caught() {
        let mut publish = run_stage(&["pgk"], &[]);
        publish.condition = Some(ConditionSpec::Named("stable-only".to_string()));

        let spec = pipeline(vec![
            ("pack", run_stage(&[], &["pkg"])),
            ("publish", publish),
        ]);
        let err = ExecutionPlan::build(&spec, &tag("3.14.0a1")).unwrap_err();
        assert!(matches!(
            err,
            Error::Graph(GraphError::UnknownProducer { artifact, .. }) if artifact == "pgk"
        ));
    }

    #[test]
    fn test_required_tools() {
        let mut build = run_stage(&[], &["unsigned"]);
        build.commands = vec![
            vec!["make".to_string(), "all".to_string()],
            vec!["bash".to_string(), "check.sh".to_string()],
        ];
        let sign = StageSpec {
            consumes: vec!["unsigned".to_string()],
            produces: vec!["bin".to_string()],
            sign: true,
            ..StageSpec::default()
        };
        let spec = pipeline(vec![("build", build), ("sign", sign)]);
        let plan = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap();

        let tools: Vec<String> = plan.required_tools().into_iter().collect();
        assert_eq!(tools, vec!["bash", "make"]);
    }

    #[test]
    fn test_transitive_dependents() {
        let spec = pipeline(vec![
            ("fetch", run_stage(&[], &["src"])),
            ("build", run_stage(&["src"], &["bin"])),
            ("pack", run_stage(&["bin"], &["pkg"])),
            ("docs", run_stage(&[], &["html"])),
        ]);
        let plan = ExecutionPlan::build(&spec, &tag("3.13.0")).unwrap();

        let affected = plan.transitive_dependents("fetch");
        assert!(affected.contains("build"));
        assert!(affected.contains("pack"));
        assert!(!affected.contains("docs"));

        assert!(plan.transitive_dependents("pack").is_empty());
    }
}
