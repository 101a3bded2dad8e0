//! Matrix fan-out and instance naming
//!
//! Expansion turns each declared stage into one instance per point of its
//! matrix. Instance names append the variant suffix to the stage name, and
//! artifact templates expand the same way: a template without placeholders
//! is decorated with the variant suffix, `${variant}` substitutes the joined
//! suffix, and `${<axis>}` substitutes that axis value.

use serde::Serialize;
use shipwright_errors::GraphError;
use shipwright_types::{AxisValue, MatrixAxis, ReleaseTag, Variant};
use std::collections::{BTreeMap, HashSet};

use crate::condition::StageCondition;
use crate::spec::{AxisValueSpec, PipelineSpec, StageSpec};

/// How a stage instance does its work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    /// Execute the declared command list
    Run,
    /// Copy consumed artifacts to outputs and route them through the
    /// signing gate
    Sign,
}

/// One artifact consumed or produced by an instance
///
/// The base is the name as declared on the stage. Commands and work
/// directory layout address artifacts by base, so one command list works
/// for every variant; the store addresses them by expanded name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactBinding {
    pub base: String,
    /// Expanded store name for this instance
    pub name: String,
}

/// One expanded stage instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageInstance {
    /// Unique instance name (stage name plus variant suffix)
    pub name: String,
    /// Declared stage this instance came from
    pub stage: String,
    pub variant: Variant,
    pub consumes: Vec<ArtifactBinding>,
    pub produces: Vec<ArtifactBinding>,
    pub commands: Vec<Vec<String>>,
    pub kind: InstanceKind,
    pub pool: Option<String>,
    /// Credential group override for sign stages
    pub signing_group: Option<String>,
}

/// Expansion output, before edges and levels are derived
#[derive(Debug)]
pub(crate) struct Expansion {
    /// Instances enabled for this release, in declaration order
    pub instances: Vec<StageInstance>,
    /// Instances gated off by their stage condition
    pub gated: Vec<StageInstance>,
    /// Artifact names a gated instance would have produced
    pub gated_artifacts: BTreeMap<String, String>,
}

pub(crate) fn expand(spec: &PipelineSpec, tag: &ReleaseTag) -> Result<Expansion, GraphError> {
    if spec.stages.is_empty() {
        return Err(GraphError::Empty);
    }

    let mut instances = Vec::new();
    let mut gated = Vec::new();
    let mut gated_artifacts: BTreeMap<String, String> = BTreeMap::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for (stage_name, stage) in &spec.stages {
        validate_stage(stage_name, stage)?;
        let condition = StageCondition::from_spec(stage_name, stage.condition.as_ref())?;
        let enabled = condition.allows(tag);
        let axes = resolve_axes(stage_name, stage, &spec.axes)?;

        for variant in variants_of(&axes) {
            let name = variant.decorate(stage_name);
            if !seen_names.insert(name.clone()) {
                return Err(GraphError::DuplicateInstance { name });
            }

            let instance = StageInstance {
                consumes: expand_names(stage_name, &stage.consumes, &variant)?,
                produces: expand_names(stage_name, &stage.produces, &variant)?,
                name,
                stage: stage_name.clone(),
                variant,
                commands: stage.commands.clone(),
                kind: if stage.sign {
                    InstanceKind::Sign
                } else {
                    InstanceKind::Run
                },
                pool: stage.pool.clone(),
                signing_group: stage.signing_group.clone(),
            };

            if enabled {
                instances.push(instance);
            } else {
                for binding in &instance.produces {
                    gated_artifacts
                        .entry(binding.name.clone())
                        .or_insert_with(|| instance.name.clone());
                }
                gated.push(instance);
            }
        }
    }

    Ok(Expansion {
        instances,
        gated,
        gated_artifacts,
    })
}

fn validate_stage(name: &str, stage: &StageSpec) -> Result<(), GraphError> {
    let invalid = |message: String| GraphError::InvalidStage {
        stage: name.to_string(),
        message,
    };

    if let Some(repeated) = first_repeat(&stage.consumes) {
        return Err(invalid(format!("consumes repeats artifact: {repeated}")));
    }
    if let Some(repeated) = first_repeat(&stage.produces) {
        return Err(invalid(format!("produces repeats artifact: {repeated}")));
    }

    if stage.sign {
        if !stage.commands.is_empty() {
            return Err(invalid("sign stages do not take commands".to_string()));
        }
        if stage.consumes.is_empty() {
            return Err(invalid(
                "sign stages must consume at least one artifact".to_string(),
            ));
        }
        if stage.consumes.len() != stage.produces.len() {
            return Err(invalid(format!(
                "sign stages pair each consumed artifact with one produced artifact, got {} and {}",
                stage.consumes.len(),
                stage.produces.len()
            )));
        }
    } else {
        if stage.signing_group.is_some() {
            return Err(invalid(
                "signing_group is only valid on sign stages".to_string(),
            ));
        }
        if stage.commands.is_empty() {
            return Err(invalid("run stages need at least one command".to_string()));
        }
        if stage.commands.iter().any(Vec::is_empty) {
            return Err(invalid("commands cannot be empty".to_string()));
        }
    }
    Ok(())
}

fn first_repeat(names: &[String]) -> Option<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

fn resolve_axes(
    stage_name: &str,
    stage: &StageSpec,
    axes: &BTreeMap<String, Vec<AxisValueSpec>>,
) -> Result<Vec<MatrixAxis>, GraphError> {
    let mut resolved = Vec::with_capacity(stage.matrix.len());
    let mut seen: HashSet<&str> = HashSet::new();

    for axis_name in &stage.matrix {
        if !seen.insert(axis_name.as_str()) {
            return Err(GraphError::InvalidStage {
                stage: stage_name.to_string(),
                message: format!("matrix repeats axis: {axis_name}"),
            });
        }
        let values = axes.get(axis_name).ok_or_else(|| GraphError::UnknownAxis {
            stage: stage_name.to_string(),
            axis: axis_name.clone(),
        })?;
        if values.is_empty() {
            return Err(GraphError::EmptyAxis {
                axis: axis_name.clone(),
            });
        }
        resolved.push(MatrixAxis::new(
            axis_name.clone(),
            values.iter().map(AxisValueSpec::to_axis_value).collect(),
        ));
    }
    Ok(resolved)
}

/// Cartesian product of the stage's axes, in axis declaration order
///
/// A stage with no matrix gets the single empty variant.
fn variants_of(axes: &[MatrixAxis]) -> Vec<Variant> {
    let mut assignments: Vec<Vec<(String, AxisValue)>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(assignments.len() * axis.values.len());
        for prefix in &assignments {
            for value in &axis.values {
                let mut pairs = prefix.clone();
                pairs.push((axis.name.clone(), value.clone()));
                next.push(pairs);
            }
        }
        assignments = next;
    }
    assignments.into_iter().map(Variant::new).collect()
}

fn expand_names(
    stage: &str,
    templates: &[String],
    variant: &Variant,
) -> Result<Vec<ArtifactBinding>, GraphError> {
    templates
        .iter()
        .map(|template| {
            Ok(ArtifactBinding {
                base: template.clone(),
                name: expand_name(stage, template, variant)?,
            })
        })
        .collect()
}

fn expand_name(stage: &str, template: &str, variant: &Variant) -> Result<String, GraphError> {
    let invalid = |message: &str| GraphError::InvalidTemplate {
        stage: stage.to_string(),
        template: template.to_string(),
        message: message.to_string(),
    };

    let name = if template.contains("${") {
        let mut name = template.replace("${variant}", &variant.suffix());
        for (axis, value) in variant.entries() {
            name = name.replace(&format!("${{{axis}}}"), &value.value);
        }
        if name.contains("${") {
            return Err(invalid("unresolved placeholder"));
        }
        name
    } else {
        variant.decorate(template)
    };

    if name.is_empty() {
        return Err(invalid("artifact name is empty"));
    }
    if name.contains('/') {
        return Err(invalid("artifact names cannot contain path separators"));
    }
    Ok(name)
}
