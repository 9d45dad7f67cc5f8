//! Converging the kernel to a desired state.
//!
//! [`apply`] retrieves the current state, computes a [`Plan`], executes it step
//! by step through the provider and re-reads the result. A failed step stops
//! the plan; steps already executed stay applied.

pub mod delta;
mod plan;
mod verify;

use std::collections::BTreeSet;

use tracing::{debug, info};

pub use delta::{ControllerChange, CreateKind, CreateSpec, InterfaceDelta};
pub use plan::{Operation, Plan};

use crate::error::{Error, Result};
use crate::provider::KernelProvider;
use crate::retrieve::retrieve;
use crate::state::NetworkState;

/// Knobs for [`apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Compute the plan but execute nothing.
    pub dry_run: bool,
    /// Do not re-read and compare after executing.
    pub skip_verification: bool,
}

/// Outcome of a successful [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// Whether any kernel operation was issued.
    pub changes_made: bool,
    /// The plan, one line per operation.
    pub summary: Vec<String>,
    /// Re-read state of the interfaces the plan touched, and their routes.
    pub verified: NetworkState,
}

/// Current state of `provider` diffed against `desired`.
pub async fn plan<P: KernelProvider>(provider: &P, desired: &NetworkState) -> Result<Plan> {
    let current = retrieve(provider).await?;
    Plan::compute(desired, &current)
}

/// Parse `document` and apply it. Nothing reaches the provider if parsing fails.
pub async fn apply_document<P: KernelProvider>(
    provider: &P,
    document: &str,
    options: ApplyOptions,
) -> Result<ApplyResult> {
    let desired = NetworkState::parse(document)?;
    apply(provider, &desired, options).await
}

/// Converge `provider` to `desired`.
///
/// # Errors
///
/// - schema errors when `desired` cannot be reached, before any mutation;
/// - [`Error::Apply`] when a step fails, naming the step;
/// - [`Error::Verification`] when the re-read state differs from `desired`.
pub async fn apply<P: KernelProvider>(
    provider: &P,
    desired: &NetworkState,
    options: ApplyOptions,
) -> Result<ApplyResult> {
    desired.validate()?;

    let current = retrieve(provider).await?;
    let plan = Plan::compute(desired, &current)?;
    let summary = plan.summary();
    let touched = plan.touched();

    if plan.is_empty() || options.dry_run {
        debug!(steps = plan.len(), dry_run = options.dry_run, "nothing executed");
        return Ok(ApplyResult {
            changes_made: false,
            summary,
            verified: subset(&current, &touched),
        });
    }

    execute(provider, &plan).await?;

    let after = retrieve(provider).await?;
    if !options.skip_verification {
        verify::verify(desired, &plan, &after)?;
    }

    Ok(ApplyResult {
        changes_made: true,
        summary,
        verified: subset(&after, &touched),
    })
}

async fn execute<P: KernelProvider>(provider: &P, plan: &Plan) -> Result<()> {
    let total = plan.len();

    for (i, op) in plan.operations.iter().enumerate() {
        let step = i + 1;
        info!(step, total, operation = %op, "applying");

        let result = match op {
            Operation::Create(spec) => provider.create_interface(spec).await,
            Operation::Modify { name, delta } => provider.modify_interface(name, delta).await,
            Operation::Delete { name, .. } => provider.delete_interface(name).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if matches!(op, Operation::Delete { .. }) && e.is_not_found() => {
                debug!(step, iface = op.name(), "already gone");
            }
            Err(source) => {
                return Err(Error::Apply {
                    index: step,
                    total,
                    operation: op.to_string(),
                    source,
                });
            }
        }
    }

    Ok(())
}

fn subset(state: &NetworkState, names: &BTreeSet<String>) -> NetworkState {
    NetworkState {
        ifaces: state
            .ifaces
            .iter()
            .filter(|i| names.contains(&i.name))
            .cloned()
            .collect(),
        routes: state
            .routes
            .iter()
            .filter(|r| names.contains(&r.oif))
            .cloned()
            .collect(),
        route_rules: Vec::new(),
    }
}
