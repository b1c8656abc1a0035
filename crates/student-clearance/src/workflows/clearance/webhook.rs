//! Checkout-completed notification sent once station staff have received every item.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::catalog::ClearanceCatalog;
use super::domain::{ClearanceCategory, Student};
use crate::config::WebhookConfig;

pub const CHECKOUT_SOURCE: &str = "station_staff_interface";
pub const PAYLOAD_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCompleted {
    pub timestamp: DateTime<Utc>,
    pub student: CheckoutStudent,
    pub completed_items: Vec<CheckoutItem>,
    pub summary: CheckoutSummary,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStudent {
    pub id: String,
    pub name: String,
    pub student_id: String,
    pub grade: String,
    pub section: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hall: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub id: String,
    pub name: String,
    pub category: ClearanceCategory,
    pub description: String,
    pub completed_at: DateTime<Utc>,
    pub completed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub total_items_submitted: usize,
    pub all_required_items_completed: bool,
    pub completion_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutMetadata {
    pub source: String,
    pub version: String,
    pub checkout_completed_at: DateTime<Utc>,
}

impl CheckoutCompleted {
    /// Snapshot of the station-submitted items for `student` as of `at`.
    pub fn build(
        student: &Student,
        catalog: &ClearanceCatalog,
        staff_name: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let completed_items: Vec<CheckoutItem> = student
            .completed_items(catalog)
            .into_iter()
            .filter(|(item, _)| item.requires_submission)
            .map(|(item, entry)| CheckoutItem {
                id: item.id.to_string(),
                name: item.name.clone(),
                category: item.category,
                description: item.description.clone(),
                completed_at: entry.completed_at.unwrap_or(at),
                completed_by: entry
                    .completed_by
                    .clone()
                    .unwrap_or_else(|| staff_name.to_string()),
                notes: entry.notes.clone(),
            })
            .collect();
        let submitted = student.submission_completion(catalog);

        Self {
            timestamp: at,
            student: CheckoutStudent {
                id: student.id.to_string(),
                name: student.name.clone(),
                student_id: student.student_number.clone(),
                grade: student.grade.clone(),
                section: student.section.clone(),
                email: student.email.clone(),
                hall: student.hall.clone(),
                room: student.room.clone(),
                advisor: student.advisor.clone(),
                teacher: student.teacher.clone(),
            },
            summary: CheckoutSummary {
                total_items_submitted: completed_items.len(),
                all_required_items_completed: submitted.is_complete(),
                completion_percentage: submitted.percentage(),
            },
            completed_items,
            metadata: CheckoutMetadata {
                source: CHECKOUT_SOURCE.to_string(),
                version: PAYLOAD_VERSION.to_string(),
                checkout_completed_at: at,
            },
        }
    }
}

/// Outbound hook for checkout notifications.
pub trait CheckoutNotifier: Send + Sync {
    fn notify(
        &self,
        payload: &CheckoutCompleted,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook rejected with status {0}")]
    Rejected(u16),
}

/// Posts checkout payloads to a configured URL. Without a URL nothing is sent.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn from_config(config: &WebhookConfig) -> Result<Self, NotifyError> {
        Self::new(config.url.clone(), config.timeout)
    }

    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            url: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

impl CheckoutNotifier for WebhookNotifier {
    async fn notify(&self, payload: &CheckoutCompleted) -> Result<(), NotifyError> {
        let Some(url) = self.url.as_deref() else {
            tracing::debug!(student = %payload.student.id, "webhook disabled; skipping checkout notification");
            return Ok(());
        };

        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}
