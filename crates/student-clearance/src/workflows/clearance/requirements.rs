use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{NewRequirement, RequirementStatus, Student, StudentRequirement};
use super::ledger::LedgerError;

impl StudentRequirement {
    /// Stored status with overdue derived against `today`. Reads never rewrite state.
    pub fn effective_status(&self, today: NaiveDate) -> RequirementStatus {
        match (self.status, self.due_date) {
            (RequirementStatus::Pending, Some(due)) if due < today => RequirementStatus::Overdue,
            (status, _) => status,
        }
    }
}

impl Student {
    pub fn assign_requirement(
        &mut self,
        id: String,
        form: NewRequirement,
        at: DateTime<Utc>,
    ) -> &StudentRequirement {
        self.requirements.push(StudentRequirement {
            id,
            teacher_name: form.teacher_name,
            requirement: form.requirement,
            due_date: form.due_date,
            priority: form.priority,
            status: RequirementStatus::Pending,
            created_at: at,
            completed_at: None,
            notes: form.notes,
        });
        let last = self.requirements.len() - 1;
        &self.requirements[last]
    }

    pub fn complete_requirement(
        &mut self,
        requirement_id: &str,
        at: DateTime<Utc>,
    ) -> Result<&StudentRequirement, LedgerError> {
        let requirement = self
            .requirements
            .iter_mut()
            .find(|requirement| requirement.id == requirement_id)
            .ok_or_else(|| LedgerError::RequirementNotFound(requirement_id.to_string()))?;
        requirement.status = RequirementStatus::Completed;
        requirement.completed_at = Some(at);
        Ok(requirement)
    }

    pub fn overdue_requirements(&self, today: NaiveDate) -> usize {
        self.requirements
            .iter()
            .filter(|requirement| requirement.effective_status(today) == RequirementStatus::Overdue)
            .count()
    }
}
