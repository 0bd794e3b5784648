//! Dependency validation: run this before persisting a workflow.
//!
//! Rules enforced:
//! 1. The definition has at least one step and every step has a task type.
//! 2. Step names must be unique within the workflow.
//! 3. Every `dependsOn` must reference an existing step name.
//! 4. The dependency graph must be acyclic (topological sort must succeed).
//!
//! Steps are addressed by their index in the definition. On success the
//! resolved edge index (`dependencies[i]` is the step that step `i` waits on)
//! is returned together with a topological order.

use std::collections::{HashMap, VecDeque};

use crate::{models::WorkflowDefinition, ValidationError};

/// Resolved dependency edges of a validated definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// `dependencies[i]` is the index of the step that step `i` depends on.
    pub dependencies: Vec<Option<usize>>,
    /// Step indices in an order where every dependency precedes its dependents.
    pub order: Vec<usize>,
}

/// Validate the definition's dependencies and return the resolved graph.
///
/// # Errors
/// - [`ValidationError::NoSteps`] / [`ValidationError::EmptyTaskType`] for
///   structurally empty definitions.
/// - [`ValidationError::DuplicateStepName`] if two steps share a name.
/// - [`ValidationError::UnknownDependency`] if `dependsOn` names no step.
/// - [`ValidationError::CycleDetected`] if the graph is not acyclic.
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<DependencyGraph, ValidationError> {
    // -----------------------------------------------------------------------
    // 1. Structure
    // -----------------------------------------------------------------------
    if definition.steps.is_empty() {
        return Err(ValidationError::NoSteps(definition.name.clone()));
    }
    if let Some(index) = definition.steps.iter().position(|s| s.task_type.trim().is_empty()) {
        return Err(ValidationError::EmptyTaskType { index });
    }

    // -----------------------------------------------------------------------
    // 2. Ensure step names are unique
    // -----------------------------------------------------------------------
    let mut by_name: HashMap<&str, usize> = HashMap::new();
    for (index, step) in definition.steps.iter().enumerate() {
        if let Some(name) = step.name.as_deref() {
            if by_name.insert(name, index).is_some() {
                return Err(ValidationError::DuplicateStepName(name.to_owned()));
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Resolve dependsOn references
    // -----------------------------------------------------------------------
    let dependencies = definition
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| match step.depends_on.as_deref() {
            None => Ok(None),
            Some(target) => by_name.get(target).copied().map(Some).ok_or_else(|| {
                ValidationError::UnknownDependency {
                    step: step.label(index),
                    depends_on: target.to_owned(),
                }
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    // -----------------------------------------------------------------------
    // 4. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let order = topological_order(&dependencies).map_err(|stuck| ValidationError::CycleDetected {
        steps: stuck
            .into_iter()
            .map(|i| definition.steps[i].label(i))
            .collect(),
    })?;

    Ok(DependencyGraph { dependencies, order })
}

/// Kahn's algorithm over single-parent edges.
///
/// Returns the visit order, or the indices that could never be visited
/// (every step on or behind a cycle) in ascending order.
pub fn topological_order(dependencies: &[Option<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = dependencies.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for (index, dep) in dependencies.iter().enumerate() {
        if let Some(dep) = *dep {
            dependents[dep].push(index);
            in_degree[index] += 1;
        }
    }

    // Seed in index order so the result is deterministic.
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<usize> = Vec::with_capacity(n);

    while let Some(index) = queue.pop_front() {
        sorted.push(index);
        for &next in &dependents[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    // If we didn't visit every step the graph contains a cycle.
    if sorted.len() != n {
        return Err((0..n).filter(|&i| in_degree[i] > 0).collect());
    }

    Ok(sorted)
}
