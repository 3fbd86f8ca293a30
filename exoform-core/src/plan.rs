//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }

    /// One line per effect, prefixed with its symbol
    pub fn brief(&self) -> String {
        self.effects
            .iter()
            .map(|e| format!("{}\n", format_effect_brief(e)))
            .collect()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

/// Format an effect briefly for display
fn format_effect_brief(effect: &Effect) -> String {
    let symbol = match effect {
        Effect::Create(_) => "+",
        Effect::Update { .. } => "~",
        Effect::Replace { .. } => "-/+",
        Effect::Delete { .. } => "-",
    };
    format!("{} {}", symbol, effect.resource_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, Resource, ResourceId, State};

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.summary(), PlanSummary::default());
    }

    #[test]
    fn plan_summary() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("exoscale_elastic_ip", "a")));
        plan.add(Effect::Create(Resource::new("exoscale_elastic_ip", "b")));
        let id = ResourceId::new("exoscale_elastic_ip", "c");
        plan.add(Effect::Delete {
            id: id.clone(),
            from: State::existing(id, Attributes::new()),
        });

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.delete, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 2 to create, 0 to update, 0 to replace, 1 to delete"
        );
    }

    #[test]
    fn brief_lists_effects() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("exoscale_security_group", "web")));
        let id = ResourceId::new("exoscale_security_group", "db");
        plan.add(Effect::Replace {
            id: id.clone(),
            from: State::existing(id, Attributes::new()),
            to: Resource::new("exoscale_security_group", "db"),
            replaced_by: vec!["name".to_string()],
        });

        assert_eq!(
            plan.brief(),
            "+ exoscale_security_group.web\n-/+ exoscale_security_group.db\n"
        );
    }
}
