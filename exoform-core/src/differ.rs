//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in configuration with the "current
//! state" tracked for each resource, and generates the Effects required to
//! converge them. Comparison follows the resource schema: computed attributes
//! omitted from configuration are not changes, case-insensitive attributes
//! ignore letter case and force-new attributes turn an update into a replacement.

use std::collections::{BTreeSet, HashMap};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Attributes, Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        replaced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(schema: &ResourceSchema, desired: &Resource, current: &State) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let mut attributes = desired.attributes.clone();
    schema.apply_defaults(&mut attributes);
    let changed = find_changed_attributes(schema, &attributes, &current.attributes);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replaced_by = schema.requires_replacement(&changed);
    if replaced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            replaced_by,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    schema: &ResourceSchema,
    desired: &Attributes,
    current: &Attributes,
) -> Vec<String> {
    let mut changed = schema.changed_attributes(current, desired);

    // Attributes unknown to the schema are compared verbatim
    for (key, desired_value) in desired {
        if schema.attributes.contains_key(key) {
            continue;
        }
        if current.get(key) != Some(desired_value) {
            changed.push(key.clone());
        }
    }

    changed
}

/// Compute Diff for every configured resource and generate a Plan.
///
/// Tracked resources that are no longer configured are deleted.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let schema = schemas
            .get(&resource.id.resource_type)
            .cloned()
            .unwrap_or_else(|| ResourceSchema::new(&resource.id.resource_type));

        match diff(&schema, resource, &current) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                replaced_by,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                replaced_by,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let configured: BTreeSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !configured.contains(&s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));
    for state in orphans {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }

    plan
}

/// Elements to add and to remove to turn one set into another
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetDiff<T: Ord> {
    pub added: BTreeSet<T>,
    pub removed: BTreeSet<T>,
}

impl<T: Ord> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `added = new - old`, `removed = old - new`
pub fn set_difference<T: Ord + Clone>(old: &BTreeSet<T>, new: &BTreeSet<T>) -> SetDiff<T> {
    SetDiff {
        added: new.difference(old).cloned().collect(),
        removed: old.difference(new).cloned().collect(),
    }
}
