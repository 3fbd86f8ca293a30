//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use std::sync::Arc;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{ErrorKind, Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceData, ResourceId, State};
use crate::schema::ResourceSchema;
use crate::timeouts::Timeouts;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Replace succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { id: ResourceId, reason: String },
}

impl EffectOutcome {
    /// State to record for the resource; `None` means the record is removed
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted { .. } | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// A failed Effect
#[derive(Debug)]
pub struct EffectFailure {
    pub id: ResourceId,
    pub error: ProviderError,
    /// State to record despite the failure. `None` leaves the tracked record
    /// untouched; a not-found state removes it.
    pub state: Option<State>,
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, EffectFailure>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue with the remaining Effects after a failure
    pub continue_on_error: bool,
    /// Deadlines for effects that carry no configuration (deletes, refreshes)
    pub default_timeouts: Timeouts,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            continue_on_error: true,
            default_timeouts: Timeouts::default(),
        }
    }
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn schema_for(&self, id: &ResourceId) -> ProviderResult<Arc<ResourceSchema>> {
        self.provider
            .schema(&id.resource_type)
            .map(Arc::new)
            .ok_or_else(|| {
                ProviderError::validation(format!(
                    "unsupported resource type '{}'",
                    id.resource_type
                ))
                .for_resource(id.clone())
            })
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let result = self.execute_effect(effect).await;

            match &result {
                Ok(_) => success_count += 1,
                Err(failure) => {
                    log::debug!("{} failed: {}", failure.id, failure.error);
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(&self, effect: &Effect) -> Result<EffectOutcome, EffectFailure> {
        let id = effect.resource_id().clone();
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                id,
                reason: "dry-run mode".to_string(),
            });
        }

        let schema = self.schema_for(&id).map_err(|error| EffectFailure {
            id: id.clone(),
            error,
            state: None,
        })?;

        match effect {
            Effect::Create(resource) => {
                let state = self.create(schema, resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { from, to, .. } => {
                let mut data = ResourceData::for_update(schema, from, to);
                match self.provider.update(&mut data).await {
                    Ok(()) => Ok(EffectOutcome::Updated {
                        state: data.into_state(id),
                    }),
                    Err(error) => Err(EffectFailure {
                        id: id.clone(),
                        error: error.for_resource(id),
                        state: None,
                    }),
                }
            }
            Effect::Replace { from, to, .. } => {
                self.delete(schema.clone(), from, to.timeouts).await?;
                match self.create(schema, to).await {
                    Ok(state) => Ok(EffectOutcome::Replaced { state }),
                    // The old object is gone either way
                    Err(mut failure) => {
                        failure.state =
                            failure.state.take().or_else(|| Some(State::not_found(id)));
                        Err(failure)
                    }
                }
            }
            Effect::Delete { from, .. } => {
                self.delete(schema, from, self.config.default_timeouts)
                    .await?;
                Ok(EffectOutcome::Deleted { id })
            }
        }
    }

    async fn create(
        &self,
        schema: Arc<ResourceSchema>,
        resource: &Resource,
    ) -> Result<State, EffectFailure> {
        let id = resource.id.clone();
        let mut data = ResourceData::for_create(schema, resource);
        match self.provider.create(&mut data).await {
            Ok(()) => Ok(data.into_state(id)),
            Err(error) => {
                // An identifier means the remote object exists and must stay tracked
                let state = data
                    .id()
                    .is_some()
                    .then(|| data.clone().into_partial_state(id.clone()));
                let error = if state.is_some() && error.kind == ErrorKind::Remote {
                    error.with_kind(ErrorKind::PartialCompletion)
                } else {
                    error
                };
                Err(EffectFailure {
                    id: id.clone(),
                    error: error.for_resource(id),
                    state,
                })
            }
        }
    }

    async fn delete(
        &self,
        schema: Arc<ResourceSchema>,
        from: &State,
        timeouts: Timeouts,
    ) -> Result<(), EffectFailure> {
        let id = from.id.clone();
        let mut data = ResourceData::for_state(schema, from, timeouts);
        self.provider
            .delete(&mut data)
            .await
            .map_err(|error| EffectFailure {
                id: id.clone(),
                error: error.for_resource(id),
                state: None,
            })
    }

    /// Re-read a tracked resource. A resource found gone comes back as not-found.
    pub async fn refresh(&self, state: &State) -> ProviderResult<State> {
        self.refresh_with_timeouts(state, self.config.default_timeouts)
            .await
    }

    /// Re-read a tracked resource under the deadlines configured for it
    pub async fn refresh_with_timeouts(
        &self,
        state: &State,
        timeouts: Timeouts,
    ) -> ProviderResult<State> {
        let schema = self.schema_for(&state.id)?;
        let mut data = ResourceData::for_state(schema, state, timeouts);
        self.provider
            .read(&mut data)
            .await
            .map_err(|e| e.for_resource(state.id.clone()))?;
        Ok(data.into_state(state.id.clone()))
    }

    /// Adopt an existing remote object under `id`
    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let schema = self.schema_for(id)?;
        let mut data =
            ResourceData::new(schema).with_timeouts(self.config.default_timeouts);
        self.provider
            .import(import_id, &mut data)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        if data.id().is_none() {
            return Err(ProviderError::not_found(format!(
                "no {} found for '{}'",
                id.resource_type, import_id
            ))
            .for_resource(id.clone()));
        }
        Ok(data.into_state(id.clone()))
    }
}
