use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::ExportSheet;
use crate::workflows::clearance::approval::ApprovalGate;
use crate::workflows::clearance::catalog::ClearanceCatalog;
use crate::workflows::clearance::domain::{AssignmentStatus, Student};

pub(crate) fn student_overview(students: &[Student], catalog: &ClearanceCatalog) -> ExportSheet {
    let headers = vec![
        "Student ID",
        "Full Name",
        "Grade/Year Level",
        "Section",
        "Hall",
        "Student Email",
        "Teacher",
        "Advisor",
        "Year Head",
        "Overall Status",
        "Items Completed",
        "Items Pending",
        "Outstanding Balance",
        "Station Staff Approval",
        "Teacher Approval",
        "Hall Head Approval",
        "Advisor Approval",
        "Year Head Approval",
        "Final Clearance Status",
        "Confirmation Code",
        "Date Cleared",
        "Cleared By",
    ];

    let rows = students
        .iter()
        .map(|student| {
            let completion = student.completion(catalog);
            let mut row = vec![
                student.student_number.clone(),
                student.name.clone(),
                student.grade.clone(),
                student.section.clone(),
                optional(&student.hall),
                student.email.clone(),
                optional(&student.teacher),
                optional(&student.advisor),
                optional(&student.year_head),
                if student.final_clearance.is_some() {
                    "Cleared".to_string()
                } else {
                    "Pending".to_string()
                },
                completion.completed.to_string(),
                completion.outstanding().to_string(),
                money(student.outstanding_balance),
            ];
            for gate in all_gates() {
                row.push(yes_no(student.approvals.is_granted(gate)));
            }
            row.push(student.final_clearance_status().label().to_string());
            match &student.final_clearance {
                Some(clearance) => {
                    row.push(clearance.confirmation_code.clone());
                    row.push(timestamp(clearance.approved_at));
                    row.push(clearance.approved_by.clone());
                }
                None => row.extend([String::new(), String::new(), String::new()]),
            }
            row
        })
        .collect();

    ExportSheet::new("Student Overview", headers, rows)
}

pub(crate) fn item_returns(students: &[Student], catalog: &ClearanceCatalog) -> ExportSheet {
    let headers = vec![
        "Student ID",
        "Student Name",
        "Grade",
        "Item Name",
        "Category",
        "Status",
        "Submitted/Returned Date",
        "Submitted/Returned Time",
        "Condition",
        "Received By",
        "Notes",
        "Serial Number (if assigned)",
    ];

    let mut rows = Vec::new();
    for student in students {
        for entry in &student.clearance_items {
            let Some(item) = catalog.item(&entry.item_id) else {
                continue;
            };
            // Catalog items and assigned items are linked loosely by type name.
            let item_name = item.name.to_lowercase();
            let registration = student
                .assigned_items
                .iter()
                .find(|registration| item_name.contains(registration.item_type.label()));

            rows.push(vec![
                student.student_number.clone(),
                student.name.clone(),
                student.grade.clone(),
                item.name.clone(),
                item.category.label().to_string(),
                entry.status.label().to_string(),
                entry
                    .completed_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                entry
                    .completed_at
                    .map(|at| at.format("%H:%M:%S").to_string())
                    .unwrap_or_default(),
                registration
                    .and_then(|registration| registration.condition)
                    .map_or_else(|| "N/A".to_string(), |condition| condition.label().to_string()),
                optional(&entry.completed_by),
                optional(&entry.notes),
                registration
                    .map(|registration| registration.serial_number.clone())
                    .unwrap_or_default(),
            ]);
        }
    }

    ExportSheet::new("Item Returns", headers, rows)
}

pub(crate) fn assigned_items(students: &[Student]) -> ExportSheet {
    let headers = vec![
        "Student ID",
        "Student Name",
        "Subject",
        "Item Type",
        "Item Description",
        "Serial Number",
        "Teacher",
        "Assigned Date",
        "Status",
        "Returned Date",
        "Condition",
        "Reported Issue Type",
        "Issue Description",
        "Issue Reported Date",
    ];

    let rows = students
        .iter()
        .flat_map(|student| {
            student.assigned_items.iter().map(move |registration| {
                let issue = registration.reported_issue.as_ref();
                vec![
                    student.student_number.clone(),
                    student.name.clone(),
                    optional(&registration.subject),
                    registration.item_type.label().to_string(),
                    registration.description.clone(),
                    registration.serial_number.clone(),
                    registration.teacher_name.clone(),
                    timestamp(registration.registered_at),
                    registration.status.label().to_string(),
                    registration.returned_at.map(timestamp).unwrap_or_default(),
                    registration
                        .condition
                        .map(|condition| condition.label().to_string())
                        .unwrap_or_default(),
                    issue
                        .map(|issue| issue.issue_type.label().to_string())
                        .unwrap_or_default(),
                    issue.map(|issue| issue.description.clone()).unwrap_or_default(),
                    issue.map(|issue| timestamp(issue.reported_at)).unwrap_or_default(),
                ]
            })
        })
        .collect();

    ExportSheet::new("Assigned Items", headers, rows)
}

#[derive(Debug, Default)]
struct MaterialCounts {
    total: usize,
    returned: usize,
    missing: usize,
    damaged: usize,
    assigned: usize,
}

pub(crate) fn subject_materials(students: &[Student]) -> ExportSheet {
    let headers = vec![
        "Subject",
        "Item Type",
        "Total Assigned",
        "Returned",
        "Missing",
        "Damaged",
        "Still Assigned",
    ];

    let mut grouped: BTreeMap<(String, &'static str), MaterialCounts> = BTreeMap::new();
    for registration in students.iter().flat_map(|student| &student.assigned_items) {
        let subject = registration
            .subject
            .clone()
            .unwrap_or_else(|| "General".to_string());
        let counts = grouped
            .entry((subject, registration.item_type.label()))
            .or_default();
        counts.total += 1;
        match registration.status {
            AssignmentStatus::Returned => counts.returned += 1,
            AssignmentStatus::Missing => counts.missing += 1,
            AssignmentStatus::Damaged => counts.damaged += 1,
            AssignmentStatus::Assigned => counts.assigned += 1,
        }
    }

    let rows = grouped
        .into_iter()
        .map(|((subject, item_type), counts)| {
            vec![
                subject,
                item_type.to_string(),
                counts.total.to_string(),
                counts.returned.to_string(),
                counts.missing.to_string(),
                counts.damaged.to_string(),
                counts.assigned.to_string(),
            ]
        })
        .collect();

    ExportSheet::new("Subject Materials", headers, rows)
}

pub(crate) fn financial_status(students: &[Student]) -> ExportSheet {
    let headers = vec![
        "Student ID",
        "Student Name",
        "Grade",
        "Hall",
        "Outstanding Balance",
        "Status",
    ];

    let rows = students
        .iter()
        .map(|student| {
            vec![
                student.student_number.clone(),
                student.name.clone(),
                student.grade.clone(),
                optional(&student.hall),
                money(student.outstanding_balance),
                if student.outstanding_balance > 0.0 {
                    "Outstanding".to_string()
                } else {
                    "Cleared".to_string()
                },
            ]
        })
        .collect();

    ExportSheet::new("Financial Status", headers, rows)
}

pub(crate) fn approval_status(students: &[Student]) -> ExportSheet {
    let mut headers = vec!["Student ID", "Student Name", "Grade"];
    headers.extend([
        "Station Staff",
        "Station Staff By",
        "Station Staff Date",
        "Teacher",
        "Teacher By",
        "Teacher Date",
        "Hall Head",
        "Hall Head By",
        "Hall Head Date",
        "Advisor",
        "Advisor By",
        "Advisor Date",
        "Year Head",
        "Year Head By",
        "Year Head Date",
        "Final Status",
        "Confirmation Code",
    ]);

    let rows = students
        .iter()
        .map(|student| {
            let mut row = vec![
                student.student_number.clone(),
                student.name.clone(),
                student.grade.clone(),
            ];
            for gate in all_gates() {
                match student.approvals.approval(gate) {
                    Some(approval) => row.extend([
                        "Approved".to_string(),
                        approval.approved_by,
                        timestamp(approval.approved_at),
                    ]),
                    None => row.extend(["Pending".to_string(), String::new(), String::new()]),
                }
            }
            row.push(student.final_clearance_status().label().to_string());
            row.push(
                student
                    .confirmation_code()
                    .map(str::to_string)
                    .unwrap_or_default(),
            );
            row
        })
        .collect();

    ExportSheet::new("Approval Status", headers, rows)
}

fn all_gates() -> impl Iterator<Item = ApprovalGate> {
    ApprovalGate::PRECEDING
        .into_iter()
        .chain(std::iter::once(ApprovalGate::YearHead))
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn money(amount: f64) -> String {
    format!("${amount:.2}")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}
