mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::debug;

use exoform_core::differ::create_plan;
use exoform_core::effect::Effect;
use exoform_core::interpreter::{ApplyResult, EffectOutcome, Interpreter, InterpreterConfig};
use exoform_core::plan::Plan;
use exoform_core::provider::{ErrorKind, Provider};
use exoform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use exoform_core::schema::{Mutability, ResourceSchema};
use exoform_core::timeouts::Timeouts;
use exoform_provider_exoscale::{Credentials, ExoscaleProvider, resource_schemas};
use exoform_state::{StateBackend, StateFile, create_backend};

use config::Configuration;

const DEFAULT_CONFIG_FILE: &str = "exoform.json";

#[derive(Parser)]
#[command(name = "exoform")]
#[command(about = "Declarative management of Exoscale compute resources", long_about = None)]
struct Cli {
    #[command(flatten)]
    credentials: CredentialArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CredentialArgs {
    /// Exoscale API key
    #[arg(long, env = "EXOSCALE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Exoscale API secret
    #[arg(long, env = "EXOSCALE_API_SECRET", hide_env_values = true, global = true)]
    api_secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the configuration file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the configuration file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },
    /// Destroy all tracked resources
    Destroy {
        /// Path to the configuration file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing remote object into the state
    Import {
        /// Resource type (e.g., exoscale_elastic_ip)
        resource_type: String,
        /// Logical name to track the object under
        name: String,
        /// Remote identifier: "<id>", "<id>@<zone>" or "<zone>:<id>"
        id: String,

        /// Path to the configuration file
        #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },
    /// Print resource schemas
    Schema {
        /// Only print this resource type
        resource_type: Option<String>,
    },
    /// Remove a stale state lock
    ForceUnlock {
        /// Lock ID reported by the failing command
        lock_id: String,

        /// Path to the configuration file
        #[arg(long, short, default_value = DEFAULT_CONFIG_FILE)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &cli.credentials).await,
        Commands::Apply { file } => run_apply(&file, &cli.credentials).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &cli.credentials, auto_approve).await
        }
        Commands::Import {
            resource_type,
            name,
            id,
            file,
        } => run_import(&file, &cli.credentials, &resource_type, &name, &id).await,
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&file, &lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    resource_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

fn get_provider(
    config: &Configuration,
    credentials: &CredentialArgs,
) -> Result<Interpreter<ExoscaleProvider>, String> {
    let credentials = Credentials::new(
        credentials.api_key.clone().unwrap_or_default(),
        credentials.api_secret.clone().unwrap_or_default(),
    );
    let provider =
        ExoscaleProvider::from_config(&config.provider, credentials).map_err(|e| e.to_string())?;

    Ok(Interpreter::new(provider).with_config(InterpreterConfig {
        default_timeouts: Timeouts::uniform(config.provider.timeout),
        ..Default::default()
    }))
}

fn get_backend(config: &Configuration) -> Result<Box<dyn StateBackend>, String> {
    create_backend(&config.backend_config()).map_err(|e| format!("State backend: {}", e))
}

async fn read_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    backend
        .read_state()
        .await
        .map(Option::unwrap_or_default)
        .map_err(|e| format!("Failed to read state: {}", e))
}

async fn write_state(backend: &dyn StateBackend, state_file: &mut StateFile) -> Result<(), String> {
    state_file.increment_serial();
    backend
        .write_state(state_file)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

/// Run `op` while holding the state lock. The lock is released whatever `op` returns.
async fn with_lock<T, F>(backend: &dyn StateBackend, operation: &str, op: F) -> Result<T, String>
where
    F: Future<Output = Result<T, String>>,
{
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| format!("Failed to acquire state lock: {}", e))?;

    debug!("acquired state lock {} for {}", lock.id, operation);
    let result = op.await;

    if let Err(e) = backend.release_lock(&lock).await {
        eprintln!(
            "{} failed to release state lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
    result
}

/// Re-read every tracked resource. Objects deleted out of band come back as
/// not-found and are dropped from `state_file`.
async fn refresh_states<P: Provider>(
    interpreter: &Interpreter<P>,
    state_file: &mut StateFile,
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<HashMap<ResourceId, State>, String> {
    let tracked = state_file
        .load_states(interpreter.provider())
        .map_err(|e| format!("Failed to load state: {}", e))?;

    let mut ids: Vec<&ResourceId> = tracked.keys().collect();
    ids.sort();

    let mut current = HashMap::new();
    for id in ids {
        debug!("refreshing {}", id);
        let refreshed = match configured_timeouts(resources, id) {
            Some(timeouts) => interpreter.refresh_with_timeouts(&tracked[id], timeouts).await,
            None => interpreter.refresh(&tracked[id]).await,
        }
        .map_err(|e| format!("Failed to refresh {}: {}", id, e))?;
        if !refreshed.exists {
            println!("  {} {} no longer exists", "!".yellow().bold(), id);
        }
        if let Some(schema) = schemas.get(&id.resource_type) {
            state_file.record(&refreshed, schema);
        }
        current.insert(id.clone(), refreshed);
    }
    Ok(current)
}

/// Deadlines of the configured resource tracked as `id`, if any
fn configured_timeouts(resources: &[Resource], id: &ResourceId) -> Option<Timeouts> {
    resources
        .iter()
        .find(|resource| &resource.id == id)
        .map(|resource| resource.timeouts)
}

/// Persist what each executed effect left behind
fn record_outcomes(
    state_file: &mut StateFile,
    result: &ApplyResult,
    schemas: &HashMap<String, ResourceSchema>,
) {
    for outcome in &result.outcomes {
        let state = match outcome {
            Ok(EffectOutcome::Deleted { id }) => {
                state_file.remove_resource(&id.resource_type, &id.name);
                continue;
            }
            Ok(outcome) => outcome.state(),
            Err(failure) => failure.state.as_ref(),
        };
        if let Some(state) = state
            && let Some(schema) = schemas.get(&state.id.resource_type)
        {
            state_file.record(state, schema);
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

fn run_validate(file: &Path) -> Result<(), String> {
    let config = Configuration::load(file)?;

    println!("{}", "Validating...".cyan());

    let resources = config.resources(&get_schemas())?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );

    for resource in &resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn run_plan(file: &Path, credentials: &CredentialArgs) -> Result<(), String> {
    let config = Configuration::load(file)?;
    let schemas = get_schemas();
    let resources = config.resources(&schemas)?;
    let interpreter = get_provider(&config, credentials)?;
    let backend = get_backend(&config)?;

    let mut state_file = read_state(backend.as_ref()).await?;
    let current = refresh_states(&interpreter, &mut state_file, &resources, &schemas).await?;

    let plan = create_plan(&resources, &current, &schemas);
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path, credentials: &CredentialArgs) -> Result<(), String> {
    let config = Configuration::load(file)?;
    let schemas = get_schemas();
    let resources = config.resources(&schemas)?;
    let interpreter = get_provider(&config, credentials)?;
    let backend = get_backend(&config)?;

    with_lock(
        backend.as_ref(),
        "apply",
        apply_resources(&interpreter, backend.as_ref(), &resources, &schemas),
    )
    .await
}

async fn apply_resources<P: Provider>(
    interpreter: &Interpreter<P>,
    backend: &dyn StateBackend,
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    let current = refresh_states(interpreter, &mut state_file, resources, schemas).await?;

    let plan = create_plan(resources, &current, schemas);
    print_plan(&plan);
    if plan.is_empty() {
        return write_state(backend, &mut state_file).await;
    }

    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let result = interpreter.apply(&plan).await;
    print_outcomes(&plan, &result);

    record_outcomes(&mut state_file, &result, schemas);
    write_state(backend, &mut state_file).await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_destroy(
    file: &Path,
    credentials: &CredentialArgs,
    auto_approve: bool,
) -> Result<(), String> {
    let config = Configuration::load(file)?;
    let schemas = get_schemas();
    // Read deadlines only; destroy works from the state file
    let resources = config.resources(&schemas).unwrap_or_default();
    let interpreter = get_provider(&config, credentials)?;
    let backend = get_backend(&config)?;

    with_lock(
        backend.as_ref(),
        "destroy",
        destroy_resources(
            &interpreter,
            backend.as_ref(),
            &resources,
            &schemas,
            auto_approve,
        ),
    )
    .await
}

async fn destroy_resources<P: Provider>(
    interpreter: &Interpreter<P>,
    backend: &dyn StateBackend,
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state_file = read_state(backend).await?;
    let current = refresh_states(interpreter, &mut state_file, resources, schemas).await?;

    let plan = create_plan(&[], &current, schemas);
    if plan.is_empty() {
        println!("{}", "No resources to destroy.".yellow());
        return write_state(backend, &mut state_file).await;
    }

    println!("{}", "The following resources will be destroyed:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let result = interpreter.apply(&plan).await;
    print_outcomes(&plan, &result);

    record_outcomes(&mut state_file, &result, schemas);
    write_state(backend, &mut state_file).await?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_import(
    file: &Path,
    credentials: &CredentialArgs,
    resource_type: &str,
    name: &str,
    import_id: &str,
) -> Result<(), String> {
    let config = Configuration::load(file)?;
    let schemas = get_schemas();
    let schema = schemas
        .get(resource_type)
        .ok_or_else(|| format!("Unknown resource type '{}'", resource_type))?;
    let interpreter = get_provider(&config, credentials)?;
    let backend = get_backend(&config)?;
    let id = ResourceId::new(resource_type, name);

    with_lock(backend.as_ref(), "import", async {
        let mut state_file = read_state(backend.as_ref()).await?;
        if state_file.find_resource(resource_type, name).is_some() {
            return Err(format!("{} is already tracked in the state", id));
        }

        let state = interpreter
            .import(&id, import_id)
            .await
            .map_err(|e| format!("Import failed: {}", e))?;
        state_file.record(&state, schema);
        write_state(backend.as_ref(), &mut state_file).await?;

        println!(
            "{}",
            format!(
                "✓ Imported {} (ID = {})",
                id,
                state.identifier.as_deref().unwrap_or(import_id)
            )
            .green()
            .bold()
        );
        Ok(())
    })
    .await
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let mut schemas = resource_schemas();
    if let Some(wanted) = resource_type {
        schemas.retain(|s| s.resource_type == wanted);
        if schemas.is_empty() {
            return Err(format!("Unknown resource type '{}'", wanted));
        }
    }

    for schema in &schemas {
        println!(
            "{} {}",
            schema.resource_type.cyan().bold(),
            format!("(schema version {})", schema.version).dimmed()
        );
        if let Some(description) = &schema.description {
            println!("  {}", description);
        }
        for line in schema_lines(schema) {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<(), String> {
    let config = Configuration::load(file)?;
    let backend = get_backend(&config)?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| format!("Failed to unlock: {}", e))?;
    println!("{}", format!("✓ Lock {} removed.", lock_id).green().bold());
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let header = format_effect(effect);
        let header = match effect {
            Effect::Create(_) => format!("{} {}", "+".green().bold(), header),
            Effect::Update { .. } => format!("{} {}", "~".yellow().bold(), header),
            Effect::Replace { .. } => format!("{} {}", "-/+".magenta().bold(), header),
            Effect::Delete { .. } => format!("{} {}", "-".red().bold(), header),
        };
        println!("  {}", header);
        for line in effect_details(effect) {
            println!("      {}", line.dimmed());
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn print_outcomes(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Skipped { reason, .. }) => {
                println!("  {} {} - {}", "·".dimmed(), format_effect(effect), reason);
            }
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(failure) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), failure.error);
                if failure.error.kind == ErrorKind::PartialCompletion {
                    println!(
                        "      {}",
                        "partially applied; the object stays tracked and the next apply converges it"
                            .yellow()
                    );
                }
            }
        }
    }
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete { id, .. } => format!("Delete {}", id),
    }
}

/// Attribute-level lines shown under each planned effect
fn effect_details(effect: &Effect) -> Vec<String> {
    match effect {
        Effect::Create(r) => r
            .attributes
            .iter()
            .map(|(key, value)| format!("{}: {}", key, format_value(value)))
            .collect(),
        Effect::Update {
            from,
            to,
            changed_attributes,
            ..
        } => changed_attributes
            .iter()
            .map(|key| format_change(key, &from.attributes, &to.attributes, false))
            .collect(),
        Effect::Replace {
            from,
            to,
            replaced_by,
            ..
        } => replaced_by
            .iter()
            .map(|key| format_change(key, &from.attributes, &to.attributes, true))
            .collect(),
        Effect::Delete { from, .. } => from
            .identifier
            .iter()
            .map(|identifier| format!("id: {}", identifier))
            .collect(),
    }
}

fn format_change(key: &str, from: &Attributes, to: &Attributes, forces_replacement: bool) -> String {
    let old = from.get(key).map(format_value).unwrap_or_else(|| "(none)".to_string());
    let new = to.get(key).map(format_value).unwrap_or_else(|| "(none)".to_string());
    if forces_replacement {
        format!("{}: {} → {} (forces replacement)", key, old, new)
    } else {
        format!("{}: {} → {}", key, old, new)
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_json().to_string(),
    }
}

fn schema_lines(schema: &ResourceSchema) -> Vec<String> {
    schema
        .attributes
        .values()
        .map(|attr| {
            let mut flags = vec![match attr.mutability {
                Mutability::Required => "required",
                Mutability::Optional => "optional",
                Mutability::Computed => "computed",
                Mutability::OptionalComputed => "optional, computed",
            }];
            if attr.force_new {
                flags.push("forces replacement");
            }
            if attr.case_insensitive {
                flags.push("case-insensitive");
            }

            let mut line = format!("{}: {} ({})", attr.name, attr.attr_type, flags.join(", "));
            if let Some(default) = &attr.default {
                line.push_str(&format!(" default {}", format_value(default)));
            }
            if let Some(description) = &attr.description {
                line.push_str(&format!(" - {}", description));
            }
            line
        })
        .collect()
}
