use crate::infra::{parse_date, Services};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use student_clearance::config::AppConfig;
use student_clearance::error::AppError;
use student_clearance::workflows::access::{AccountId, LoginError};
use student_clearance::workflows::clearance::{
    Approver, ApproverDirectory, ClearanceServiceError, ItemId, ItemStatus, NewStudent, StudentId,
    StudentProgressView,
};
use student_clearance::workflows::export::ClearanceExport;

#[derive(Args, Debug, Default)]
pub(crate) struct ReportArgs {
    /// Evaluation date for overdue requirements (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct ExportArgs {
    /// Directory receiving the CSV files
    #[arg(long)]
    pub(crate) out_dir: PathBuf,
    /// Write every sheet into a single file with sheet separators
    #[arg(long)]
    pub(crate) combined: bool,
    /// Date stamped into file names (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seeded student walked through the approval chain.
    #[arg(long, default_value = "1")]
    pub(crate) student: String,
    /// Seeded account used for the lockout walkthrough.
    #[arg(long, default_value = "yabebe24@alastudents.org")]
    pub(crate) lockout_email: String,
}

pub(crate) fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let services = Services::seeded(&config)?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let dashboard = services.clearance.dashboard()?;
    println!("Clearance dashboard (evaluated {})", today);
    println!(
        "- {} students | {} cleared | {} pending | {} awaiting approval",
        dashboard.total, dashboard.completed, dashboard.pending, dashboard.awaiting_approval
    );
    println!(
        "- {} with outstanding balances (${:.2} total) | {} unresolved item issues",
        dashboard.finance_outstanding,
        dashboard.outstanding_balance_total,
        dashboard.unresolved_issues
    );

    println!("\nStudent progress");
    for view in services.clearance.progress_all(today)? {
        render_progress(&view);
    }
    Ok(())
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let services = Services::seeded(&config)?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());

    let students = services.clearance.list()?;
    let export = ClearanceExport::build(&students, services.clearance.catalog());

    if args.combined {
        std::fs::create_dir_all(&args.out_dir)?;
        let path = args.out_dir.join(ClearanceExport::combined_file_name(date));
        std::fs::write(&path, export.combined_export()?)?;
        println!("Wrote {}", path.display());
    } else {
        for path in export.write_sheets(&args.out_dir, date)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let services = Services::seeded(&config)?;
    let today = Local::now().date_naive();
    let clearance = &services.clearance;

    println!("Student clearance demo");
    let registrar = services
        .auth
        .clerk("4")
        .map_err(ClearanceServiceError::from)?;
    let registered = clearance.register_student(
        &registrar,
        NewStudent {
            name: "Demo Student".to_string(),
            student_number: "ALA2024-201".to_string(),
            grade: "Year 1".to_string(),
            section: String::new(),
            email: "demo.student@alastudents.org".to_string(),
            hall: Some("East Wing".to_string()),
            room: Some("112".to_string()),
            advisor: Some("Ms. Catherine Delight".to_string()),
            teacher: Some("Ismail Adeleke".to_string()),
            year_head: Some("Ms. Sebabatso".to_string()),
            outstanding_balance: 75.0,
        },
        services.auth.as_ref(),
    )?;
    println!(
        "- Registered {} ({}) at {}% completion",
        registered.name,
        registered.id,
        registered.completion_percentage(clearance.catalog())
    );

    let student_id = StudentId(args.student);
    let student = clearance.get(&student_id)?;
    println!("\nApproval walkthrough for {}", student.name);

    let Some(station) = lookup(&services, "6") else {
        return Ok(());
    };
    let outstanding: Vec<ItemId> = clearance
        .catalog()
        .submission_items()
        .filter(|item| {
            student
                .item_status(&item.id)
                .is_some_and(|entry| entry.status != ItemStatus::Completed)
        })
        .map(|item| item.id.clone())
        .collect();
    if !outstanding.is_empty() {
        let receipt =
            clearance.record_submissions(&station, &student_id, &outstanding, &BTreeMap::new())?;
        println!(
            "- Station recorded {} items | station approval granted: {}",
            receipt.recorded.len(),
            receipt.station_approved
        );
        if let Some(payload) = receipt.checkout.as_ref() {
            match clearance.notify_checkout(payload).await {
                Some(warning) => println!("  Warning: {}", warning),
                None => println!("  Checkout notification sent"),
            }
        }
    }

    let settled = clearance.settle_finance(&registrar, &student_id)?;
    println!(
        "- Finance settled | completion {}%",
        settled.completion_percentage(clearance.catalog())
    );

    for account_id in ["5", "7", "8", "9"] {
        let Some(approver) = lookup(&services, account_id) else {
            return Ok(());
        };
        match clearance.approve(&approver, &student_id) {
            Ok(receipt) => {
                println!("- {} approved as {}", approver.name, approver.gate().label());
                if let Some(code) = receipt
                    .student
                    .confirmation_code()
                    .filter(|_| receipt.outcome.final_clearance_issued)
                {
                    println!("  Final clearance issued: {}", code);
                }
            }
            Err(err) => println!("- {} could not approve: {}", approver.name, err),
        }
    }
    render_progress(&clearance.progress(&student_id, today)?);

    println!("\nLogin guard walkthrough for {}", args.lockout_email);
    let auth = &services.auth;
    let mut unlock_request = None;
    for attempt in 1.. {
        match auth.login(&args.lockout_email, "not-the-password") {
            Err(LoginError::InvalidCredentials { attempts_remaining }) => {
                println!("- Attempt {}: rejected, {} remaining", attempt, attempts_remaining);
            }
            Err(LoginError::AccountLocked {
                locked_until,
                unlock_request: request,
            }) => {
                println!("- Attempt {}: account locked until {}", attempt, locked_until);
                unlock_request = request;
                break;
            }
            Err(err) => {
                println!("- Attempt {}: {}", attempt, err);
                break;
            }
            Ok(_) => break,
        }
    }

    let Some(request_id) = unlock_request else {
        println!("  No unlock request was opened");
        return Ok(());
    };
    let admin = AccountId("4".to_string());
    let approved = auth.approve_unlock(&admin, &request_id, Some("Identity verified".to_string()))?;
    println!(
        "- Unlock request {} {} by {}",
        approved.id,
        approved.status.label(),
        approved.processed_by.as_deref().unwrap_or_default()
    );

    let password = config.login.demo_password.clone();
    match auth.login(&args.lockout_email, &password) {
        Ok(success) => println!("- {} signed in again", success.account.name),
        Err(err) => println!("- Login still refused: {}", err),
    }

    Ok(())
}

fn lookup(services: &Services, account_id: &str) -> Option<Approver> {
    match services.auth.approver(account_id) {
        Ok(approver) => Some(approver),
        Err(err) => {
            println!("  Approver {} unavailable: {}", account_id, err);
            None
        }
    }
}

fn render_progress(view: &StudentProgressView) {
    println!(
        "- {} ({}): {}% items | {}% approvals | status {} | year head {}",
        view.name,
        view.student_number,
        view.completion_percentage,
        view.approval_progress,
        view.status.label(),
        view.year_head_decision
    );
    if let Some(code) = &view.confirmation_code {
        println!("  Confirmation code: {}", code);
    }
    if view.overdue_requirements > 0 {
        println!("  Overdue requirements: {}", view.overdue_requirements);
    }
}
