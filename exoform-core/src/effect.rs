//! Effect - A side effect represented as a value
//!
//! Effects describe what will happen to a resource. Nothing is executed until
//! the Interpreter runs them against a Provider.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource that is not tracked yet
    Create(Resource),
    /// Change a tracked resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Destroy the tracked object, then create it anew
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        /// Force-new attributes whose change caused the replacement
        replaced_by: Vec<String>,
    },
    /// Destroy a tracked resource that is no longer configured
    Delete { id: ResourceId, from: State },
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } | Effect::Delete { id, .. } => {
                id
            }
        }
    }

    /// Short verb used in plan output
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Create(_) => "create",
            Effect::Update { .. } => "update",
            Effect::Replace { .. } => "replace",
            Effect::Delete { .. } => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_of_each_effect() {
        let id = ResourceId::new("exoscale_security_group", "web");
        let from = State::existing(id.clone(), Default::default()).with_identifier("sg-1");

        let create = Effect::Create(Resource::new("exoscale_security_group", "web"));
        let delete = Effect::Delete {
            id: id.clone(),
            from,
        };
        assert_eq!(create.resource_id(), &id);
        assert_eq!(delete.resource_id(), &id);
        assert_eq!(delete.kind(), "delete");
    }
}
