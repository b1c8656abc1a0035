use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::approval::ApprovalStatus;
use super::catalog::ClearanceCatalog;
use super::domain::{
    ClearanceCategory, ClearanceItem, ClearanceStatus, ItemId, ItemStatus, NewStudent, Student,
    StudentId,
};

/// Completed vs required count for a set of catalog items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub completed: usize,
    pub required: usize,
}

impl Completion {
    /// Whole percent, half rounded up. An empty requirement set counts as 0%.
    pub fn percentage(&self) -> u8 {
        if self.required == 0 {
            return 0;
        }
        ((self.completed * 200 + self.required) / (self.required * 2)) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.required > 0 && self.completed >= self.required
    }

    pub fn outstanding(&self) -> usize {
        self.required.saturating_sub(self.completed)
    }
}

/// Overwrite payload for a single ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStatusUpdate {
    pub status: ItemStatus,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub outstanding_amount: Option<f64>,
}

impl ItemStatusUpdate {
    pub fn completed(by: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Completed,
            completed_by: Some(by.into()),
            notes: None,
            outstanding_amount: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("clearance item {0} not found")]
    ItemNotFound(ItemId),
    #[error("finance item {0} changes only through finance settlement")]
    FinanceSettlementRequired(ItemId),
    #[error("assigned item {0} not found")]
    RegistrationNotFound(String),
    #[error("requirement {0} not found")]
    RequirementNotFound(String),
    #[error("assigned item {registration} already has an open issue")]
    IssueAlreadyReported { registration: String },
    #[error("assigned item {registration} is {status} and cannot take an issue report")]
    NotAssigned {
        registration: String,
        status: &'static str,
    },
    #[error("assigned item {0} has no open issue")]
    NoOpenIssue(String),
}

impl Student {
    /// Build a fresh record with one ledger entry per catalog item.
    pub fn register(id: StudentId, form: NewStudent, catalog: &ClearanceCatalog) -> Self {
        let clearance_items = catalog
            .items()
            .iter()
            .map(|item| initial_entry(&id, item, form.outstanding_balance))
            .collect();

        Self {
            id,
            name: form.name,
            student_number: form.student_number,
            grade: form.grade,
            section: form.section,
            email: form.email,
            hall: form.hall,
            room: form.room,
            advisor: form.advisor,
            teacher: form.teacher,
            year_head: form.year_head,
            outstanding_balance: form.outstanding_balance,
            clearance_items,
            approvals: ApprovalStatus::default(),
            final_clearance: None,
            assigned_items: Vec::new(),
            requirements: Vec::new(),
        }
    }

    pub fn item_status(&self, item_id: &ItemId) -> Option<&ClearanceStatus> {
        self.clearance_items
            .iter()
            .find(|entry| &entry.item_id == item_id)
    }

    /// Overwrite exactly one ledger entry, keyed by item id.
    pub fn set_item_status(
        &mut self,
        item_id: &ItemId,
        update: ItemStatusUpdate,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let entry = self
            .clearance_items
            .iter_mut()
            .find(|entry| &entry.item_id == item_id)
            .ok_or_else(|| LedgerError::ItemNotFound(item_id.clone()))?;

        entry.completed_at = match update.status {
            ItemStatus::Completed => Some(at),
            ItemStatus::Pending | ItemStatus::ActionRequired => None,
        };
        entry.status = update.status;
        entry.completed_by = update.completed_by;
        entry.notes = update.notes;
        entry.outstanding_amount = update.outstanding_amount;

        Ok(())
    }

    pub fn completion(&self, catalog: &ClearanceCatalog) -> Completion {
        self.completion_over(catalog.required_items())
    }

    /// Completion restricted to required items handed in at a station.
    pub fn submission_completion(&self, catalog: &ClearanceCatalog) -> Completion {
        self.completion_over(catalog.submission_items())
    }

    pub fn completion_percentage(&self, catalog: &ClearanceCatalog) -> u8 {
        self.completion(catalog).percentage()
    }

    pub fn all_required_completed(&self, catalog: &ClearanceCatalog) -> bool {
        self.completion(catalog).is_complete()
    }

    pub fn has_action_required(&self) -> bool {
        self.clearance_items
            .iter()
            .any(|entry| entry.status == ItemStatus::ActionRequired)
    }

    /// Ledger entries joined with their catalog item, in catalog order.
    pub fn completed_items<'c>(
        &self,
        catalog: &'c ClearanceCatalog,
    ) -> Vec<(&'c ClearanceItem, &ClearanceStatus)> {
        catalog
            .items()
            .iter()
            .filter_map(|item| {
                self.item_status(&item.id)
                    .filter(|entry| entry.status == ItemStatus::Completed)
                    .map(|entry| (item, entry))
            })
            .collect()
    }

    /// Clear the balance and mark every finance item settled.
    pub fn settle_finance(
        &mut self,
        catalog: &ClearanceCatalog,
        officer: &str,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        for item in catalog.items_in(ClearanceCategory::Finance) {
            self.set_item_status(&item.id, ItemStatusUpdate::completed(officer), at)?;
        }
        self.outstanding_balance = 0.0;
        Ok(())
    }

    fn completion_over<'c>(&self, items: impl Iterator<Item = &'c ClearanceItem>) -> Completion {
        let mut completion = Completion {
            completed: 0,
            required: 0,
        };
        for item in items {
            completion.required += 1;
            if self
                .item_status(&item.id)
                .is_some_and(|entry| entry.status == ItemStatus::Completed)
            {
                completion.completed += 1;
            }
        }
        completion
    }
}

fn initial_entry(student_id: &StudentId, item: &ClearanceItem, balance: f64) -> ClearanceStatus {
    let owes = item.category == ClearanceCategory::Finance && balance > 0.0;
    ClearanceStatus {
        item_id: item.id.clone(),
        student_id: student_id.clone(),
        status: if owes {
            ItemStatus::ActionRequired
        } else {
            ItemStatus::Pending
        },
        completed_by: None,
        completed_at: None,
        notes: None,
        outstanding_amount: owes.then_some(balance),
    }
}
