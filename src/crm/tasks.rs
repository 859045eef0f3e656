use uuid::Uuid;

use super::access::AccessContext;
use super::{validation, ContactService};
use crate::error::{CrmError, Result};
use crate::models::{NewTask, Task};

impl ContactService<'_> {
    pub fn create_task(&self, contact_id: Uuid, mut input: NewTask, ctx: &AccessContext) -> Result<Task> {
        self.load_contact(contact_id, ctx)?;
        validation::prepare_task(&mut input)?;

        let mut task = Task::new(contact_id, input.title);
        task.description = input.description;
        task.due_at = input.due_at;
        task.assigned_to = input.assigned_to;
        task.created_by = Some(ctx.user_id().to_string());

        self.db.insert_task(&task)?;
        tracing::info!(contact_id = %contact_id, task_id = %task.id, "task created");
        self.load_task(task.id)
    }

    /// Mark a task done. Completing an already completed task returns it unchanged.
    pub fn complete_task(&self, task_id: Uuid, ctx: &AccessContext) -> Result<Task> {
        let task = self.load_task(task_id)?;
        self.load_contact(task.contact_id, ctx)?;
        if task.is_completed() {
            return Ok(task);
        }

        self.db.complete_task(task_id)?;
        tracing::info!(task_id = %task_id, user = ctx.user_id(), "task completed");
        self.load_task(task_id)
    }

    pub fn list_contact_tasks(
        &self,
        contact_id: Uuid,
        ctx: &AccessContext,
        include_completed: bool,
    ) -> Result<Vec<Task>> {
        self.load_contact(contact_id, ctx)?;
        self.db.get_tasks_for_contact(contact_id, include_completed)
    }

    fn load_task(&self, id: Uuid) -> Result<Task> {
        self.db
            .get_task(id)?
            .ok_or_else(|| CrmError::not_found("Task", id))
    }
}
