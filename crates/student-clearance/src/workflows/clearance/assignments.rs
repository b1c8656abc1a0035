use chrono::{DateTime, Utc};

use super::domain::{
    AssignmentStatus, ItemCondition, ItemRegistration, IssueType, NewItemRegistration,
    ReportedIssue, Student,
};
use super::ledger::LedgerError;

impl Student {
    pub fn register_item(
        &mut self,
        id: String,
        form: NewItemRegistration,
        at: DateTime<Utc>,
    ) -> &ItemRegistration {
        self.assigned_items.push(ItemRegistration {
            id,
            teacher_name: form.teacher_name,
            subject: form.subject,
            serial_number: form.serial_number,
            item_type: form.item_type,
            description: form.description,
            registered_at: at,
            status: AssignmentStatus::Assigned,
            returned_at: None,
            condition: None,
            reported_issue: None,
        });
        let last = self.assigned_items.len() - 1;
        &self.assigned_items[last]
    }

    /// Flag an assigned item as missing or damaged. The registration takes the issue
    /// type as its status until the item comes back.
    pub fn report_issue(
        &mut self,
        registration_id: &str,
        issue_type: IssueType,
        description: String,
        at: DateTime<Utc>,
    ) -> Result<&ItemRegistration, LedgerError> {
        let registration = self.registration_mut(registration_id)?;
        if registration
            .reported_issue
            .as_ref()
            .is_some_and(|issue| !issue.resolved)
        {
            return Err(LedgerError::IssueAlreadyReported {
                registration: registration_id.to_string(),
            });
        }
        if registration.status != AssignmentStatus::Assigned {
            return Err(LedgerError::NotAssigned {
                registration: registration_id.to_string(),
                status: registration.status.label(),
            });
        }

        registration.status = issue_type.as_status();
        registration.reported_issue = Some(ReportedIssue {
            issue_type,
            reported_at: at,
            description,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        });
        Ok(registration)
    }

    /// Close the open issue. The registration status is left as reported.
    pub fn resolve_issue(
        &mut self,
        registration_id: &str,
        resolved_by: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&ItemRegistration, LedgerError> {
        let registration = self.registration_mut(registration_id)?;
        let issue = registration
            .reported_issue
            .as_mut()
            .filter(|issue| !issue.resolved)
            .ok_or_else(|| LedgerError::NoOpenIssue(registration_id.to_string()))?;

        issue.resolved = true;
        issue.resolved_at = Some(at);
        issue.resolved_by = Some(resolved_by.to_string());
        issue.resolution_notes = notes;
        Ok(registration)
    }

    pub fn mark_returned(
        &mut self,
        registration_id: &str,
        condition: ItemCondition,
        at: DateTime<Utc>,
    ) -> Result<&ItemRegistration, LedgerError> {
        let registration = self.registration_mut(registration_id)?;
        registration.status = AssignmentStatus::Returned;
        registration.returned_at = Some(at);
        registration.condition = Some(condition);
        Ok(registration)
    }

    pub fn unresolved_issues(&self) -> usize {
        self.assigned_items
            .iter()
            .filter(|item| {
                item.reported_issue
                    .as_ref()
                    .is_some_and(|issue| !issue.resolved)
            })
            .count()
    }

    fn registration_mut(&mut self, id: &str) -> Result<&mut ItemRegistration, LedgerError> {
        self.assigned_items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| LedgerError::RegistrationNotFound(id.to_string()))
    }
}
