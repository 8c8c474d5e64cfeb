//! Top-level chain-of-trust verification.

use std::sync::Arc;

use tracing::{error, info};

use cot_core::{Result, RoleLabel, TaskId};

use crate::audit::AuditLog;
use crate::chain::Chain;
use crate::checks::{check_num_tasks, raise_on_errors, verify_task_types, verify_worker_impls};
use crate::context::Context;
use crate::download::{download_cot, download_firefox_cot_artifacts};
use crate::signature::verify_cot_signatures;

async fn verify(context: Arc<Context>, task_id: TaskId, role: RoleLabel) -> Result<()> {
    let chain = Chain::build(context, task_id, role).await?;

    download_cot(&chain).await?;
    verify_cot_signatures(&chain).await?;
    download_firefox_cot_artifacts(&chain).await?;

    let (mut findings, counts) = verify_task_types(&chain)?;
    findings.extend(check_num_tasks(&counts));
    findings.extend(verify_worker_impls(&chain)?);
    raise_on_errors(findings)?;

    if chain.is_try() {
        info!(task_id = %chain.task_id(), "Chain of trust includes try tasks");
    }
    Ok(())
}

/// Verify the whole chain of trust of `task_id`.
///
/// The graph is resolved, every attestation is downloaded and its signature
/// checked, the artifacts the checks rely on are downloaded against their
/// declared digests, and then every policy check runs. All findings are
/// reported together.
///
/// Everything logged along the way is recorded to the audit log under the
/// configured artifact directory, on success and on failure.
pub async fn verify_chain_of_trust(
    context: Arc<Context>,
    task_id: TaskId,
    role: RoleLabel,
) -> Result<()> {
    let audit = AuditLog::create(context.config.audit_log_path())?;

    audit
        .scope(async {
            info!(task_id = %task_id, role = %role, "Verifying chain of trust");
            let result = verify(context, task_id.clone(), role).await;
            match &result {
                Ok(()) => info!(task_id = %task_id, "Good."),
                Err(e) => error!(task_id = %task_id, "{e}"),
            }
            result
        })
        .await
}
