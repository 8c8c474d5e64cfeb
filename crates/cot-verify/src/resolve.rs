//! Recursive dependency resolution.
//!
//! The resolver owns the link arena while the graph is being discovered.
//! Claiming a task id and checking for an existing claim happen in one
//! critical section, so concurrent branches that reach the same task
//! produce exactly one link.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::{try_join_all, BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use cot_core::{CotError, Result, RoleLabel, TaskDefinition, TaskId, TaskType};

use crate::context::Context;
use crate::link::Link;

#[derive(Default)]
struct Arena {
    claimed: HashSet<TaskId>,
    links: Vec<Arc<Link>>,
}

/// Single owner of the links discovered during resolution.
pub struct Resolver {
    context: Arc<Context>,
    arena: Mutex<Arena>,
}

impl Resolver {
    /// Create a new Resolver with an empty arena.
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            arena: Mutex::new(Arena::default()),
        }
    }

    /// Create a Resolver that already holds `links`.
    #[cfg(test)]
    pub(crate) fn with_links(context: Arc<Context>, links: Vec<Arc<Link>>) -> Self {
        let claimed = links.iter().map(|l| l.task_id().clone()).collect();
        Self {
            context,
            arena: Mutex::new(Arena { claimed, links }),
        }
    }

    /// Claim `task_id`. Returns false if another branch already did.
    async fn claim(&self, task_id: &TaskId) -> bool {
        self.arena.lock().await.claimed.insert(task_id.clone())
    }

    async fn insert(&self, link: Link) {
        self.arena.lock().await.links.push(Arc::new(link));
    }

    /// Links discovered so far, in insertion order.
    #[cfg(test)]
    pub(crate) async fn links(&self) -> Vec<Arc<Link>> {
        self.arena.lock().await.links.clone()
    }

    /// Consume the resolver and return its links.
    pub async fn into_links(self) -> Vec<Arc<Link>> {
        self.arena.into_inner().links
    }
}

/// Upstream tasks of `task`, as `(role label, task id)` pairs.
///
/// - `<role>:decision` when the task was scheduled by another task
/// - `<role>:docker-image` when the task declares a chain-of-trust image input
/// - `<role>:<taskType>` for each upstream artifact entry, one per task id
pub fn find_task_dependencies(
    task: &TaskDefinition,
    role: &RoleLabel,
    task_id: &TaskId,
) -> Result<Vec<(RoleLabel, TaskId)>> {
    debug!(role = %role, task_id = %task_id, "Finding task dependencies");
    let mut deps = Vec::new();

    let group_id = task.task_group_id();
    if group_id != *task_id {
        deps.push((role.join(TaskType::Decision.as_str()), group_id));
    }

    if let Some(image_task_id) = task.docker_image_input() {
        deps.push((role.join(TaskType::DockerImage.as_str()), image_task_id));
    }

    let mut upstream_seen = HashSet::new();
    for upstream in task.upstream_artifacts()? {
        if upstream_seen.insert(upstream.task_id.clone()) {
            deps.push((role.join(&upstream.task_type), upstream.task_id));
        }
    }

    Ok(deps)
}

/// Fetch `task_id` and, recursively, everything it depends on.
///
/// Stops at task ids that already have a link. Independent branches are
/// fetched concurrently; the first failure aborts the rest.
pub fn build_task_dependencies(
    resolver: &Resolver,
    role: RoleLabel,
    task_id: TaskId,
) -> BoxFuture<'_, Result<()>> {
    async move {
        if !resolver.claim(&task_id).await {
            debug!(task_id = %task_id, role = %role, "Link already exists, skipping");
            return Ok(());
        }

        let max = resolver.context.config.max_chain_length;
        if role.depth() > max {
            return Err(CotError::ChainTooLong {
                role: role.to_string(),
                max,
            });
        }

        let cot_dir = resolver.context.config.cot_dir(&task_id)?;

        info!(task_id = %task_id, role = %role, "Fetching task definition");
        let definition = resolver
            .context
            .queue
            .get_task(&task_id)
            .await
            .map_err(|e| CotError::DependencyFetch {
                task_id: task_id.to_string(),
                reason: e.to_string(),
            })?;
        let task = TaskDefinition::from_value(&task_id, definition)?;
        let deps = find_task_dependencies(&task, &role, &task_id)?;
        resolver.insert(Link::new(role, task, cot_dir)).await;

        try_join_all(
            deps.into_iter()
                .map(|(dep_role, dep_id)| build_task_dependencies(resolver, dep_role, dep_id)),
        )
        .await?;
        Ok(())
    }
    .boxed()
}
