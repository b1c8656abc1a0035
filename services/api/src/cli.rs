use crate::demo::{run_demo, run_export, run_report, DemoArgs, ExportArgs, ReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use student_clearance::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Student Clearance",
    about = "Run the student clearance service or inspect its seeded data from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the dashboard and per-student progress for the seeded students
    Report(ReportArgs),
    /// Write the clearance spreadsheets as CSV files
    Export(ExportArgs),
    /// Walk a student to final clearance and a locked account through unlock
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Report(args) => run_report(args),
        Command::Export(args) => run_export(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
