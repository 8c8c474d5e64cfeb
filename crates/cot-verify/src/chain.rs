//! The chain of trust rooted at the task under verification.

use std::collections::HashSet;
use std::sync::Arc;

use cot_core::{CotError, Result, RoleLabel, TaskDefinition, TaskId};
use tracing::info;

use crate::context::Context;
use crate::link::Link;
use crate::resolve::{build_task_dependencies, Resolver};

/// Every link of a verification, root first.
///
/// Task ids are unique across links.
pub struct Chain {
    task_id: TaskId,
    role: RoleLabel,
    context: Arc<Context>,
    links: Vec<Arc<Link>>,
}

impl Chain {
    /// Resolve the whole dependency graph of `task_id`.
    pub async fn build(context: Arc<Context>, task_id: TaskId, role: RoleLabel) -> Result<Self> {
        info!(task_id = %task_id, role = %role, "Building chain of trust");

        let resolver = Resolver::new(context.clone());
        build_task_dependencies(&resolver, role.clone(), task_id.clone()).await?;
        let links = resolver.into_links().await;

        info!(task_id = %task_id, links = links.len(), "Chain of trust resolved");
        Self::from_links(context, links)
    }

    /// Assemble a chain from resolved links. The first link is the root.
    pub fn from_links(context: Arc<Context>, links: Vec<Arc<Link>>) -> Result<Self> {
        let root = links
            .first()
            .ok_or_else(|| CotError::LinkLookup("a chain needs at least its root link".to_string()))?;
        let mut chain = Self {
            task_id: root.task_id().clone(),
            role: root.role().clone(),
            context,
            links: Vec::with_capacity(links.len()),
        };
        for link in links {
            chain.add_link(link)?;
        }
        Ok(chain)
    }

    /// Append a link, rejecting a duplicate task id.
    pub fn add_link(&mut self, link: Arc<Link>) -> Result<()> {
        if self.links.iter().any(|l| l.task_id() == link.task_id()) {
            return Err(CotError::LinkLookup(format!(
                "duplicate link for {}",
                link.task_id()
            )));
        }
        self.links.push(link);
        Ok(())
    }

    /// Task id of the root.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Role label of the root.
    pub fn role(&self) -> &RoleLabel {
        &self.role
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// All links, the root included.
    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    pub fn root_link(&self) -> Result<&Arc<Link>> {
        self.get_link(&self.task_id)
    }

    /// Task definition of the root.
    pub fn task(&self) -> Result<&TaskDefinition> {
        Ok(self.root_link()?.task())
    }

    /// The decision task that scheduled the root.
    pub fn decision_task_id(&self) -> Result<TaskId> {
        Ok(self.task()?.task_group_id())
    }

    /// Task ids of every link except the root.
    pub fn dependent_task_ids(&self) -> HashSet<TaskId> {
        self.links
            .iter()
            .map(|link| link.task_id())
            .filter(|id| **id != self.task_id)
            .cloned()
            .collect()
    }

    /// The unique link for `task_id`.
    ///
    /// No match and multiple matches are both errors.
    pub fn get_link(&self, task_id: &TaskId) -> Result<&Arc<Link>> {
        let mut matches = self.links.iter().filter(|l| l.task_id() == task_id);
        match (matches.next(), matches.next()) {
            (Some(link), None) => Ok(link),
            (None, _) => Err(CotError::LinkLookup(format!("no link for {task_id}"))),
            (Some(_), Some(_)) => Err(CotError::LinkLookup(format!(
                "more than one link for {task_id}"
            ))),
        }
    }

    /// True if any task in the graph is a try submission.
    pub fn is_try(&self) -> bool {
        self.links.iter().any(|link| link.is_try())
    }
}
