// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use cajas_diarias::{
    auth, entities::branch, open_database, range_report, summary::daily_summary, write_csv, BranchScope,
    Config, NewUser, ReportQuery, Role, User,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cajas", version, about = "Daily cash registers for every branch")]
struct Cli {
    /// Path to the TOML settings file (default: .cajas/secrets.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and seed default catalogs
    Init,

    /// Add a branch
    AddBranch {
        name: String,
    },

    /// Add a user
    AddUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        /// admin, gerente or encargado
        #[arg(long, default_value = "encargado")]
        role: String,
        /// Assigned branch id (branch managers)
        #[arg(long)]
        branch: Option<i64>,
    },

    /// Range report for one or all branches
    Report {
        /// YYYY-MM-DD (default: first of the month)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Branch id (default: all branches)
        #[arg(long)]
        branch: Option<i64>,
        /// Write the detail rows to this CSV file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Daily summary of a branch
    Summary {
        #[arg(long)]
        branch: i64,
        /// YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Browse a branch day by day in the terminal
    View {
        #[arg(long)]
        branch: i64,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// The CLI runs with local admin rights over the database file
fn operator() -> User {
    User {
        id: "cli".to_string(),
        email: "cli@localhost".to_string(),
        full_name: "CLI".to_string(),
        role: Role::Admin,
        branch_id: None,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cajas_diarias=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let conn = open_database(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;

    match cli.command {
        Commands::Init => run_init(&conn, &config),
        Commands::AddBranch { name } => {
            let created = branch::create_branch(&conn, name.trim())?;
            println!("✓ Branch #{} \"{}\" created", created.id, created.name);
            Ok(())
        }
        Commands::AddUser {
            email,
            password,
            name,
            role,
            branch,
        } => {
            let user = auth::create_user(
                &conn,
                &NewUser {
                    email,
                    password,
                    full_name: name,
                    role,
                    branch_id: branch,
                },
            )?;
            println!("✓ User {} ({}) created", user.email, user.role.label());
            Ok(())
        }
        Commands::Report { from, to, branch, out } => run_report(&conn, &config, from, to, branch, out),
        Commands::Summary { branch, date } => run_summary(&conn, &config, branch, date),
        Commands::View { branch, date } => run_view(&conn, &config, branch, date),
    }
}

fn run_init(conn: &Connection, config: &Config) -> Result<()> {
    println!("🗄️  Database ready: {}", config.database.display());
    println!("   Branches:        {}", cajas_diarias::db::count_rows(conn, "branches")?);
    println!("   Categories:      {}", cajas_diarias::db::count_rows(conn, "categories")?);
    println!("   Payment methods: {}", cajas_diarias::db::count_rows(conn, "payment_methods")?);
    println!("   Users:           {}", cajas_diarias::db::count_rows(conn, "user_profiles")?);
    Ok(())
}

fn run_report(
    conn: &Connection,
    config: &Config,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    branch: Option<i64>,
    out: Option<PathBuf>,
) -> Result<()> {
    let scope = branch.map(BranchScope::One).unwrap_or(BranchScope::All);
    let defaults = ReportQuery::month_to_date(config.today(), scope);
    let query = ReportQuery {
        from: from.unwrap_or(defaults.from),
        to: to.unwrap_or(defaults.to),
        scope,
    };

    let report = range_report(conn, &operator(), query)?;
    if report.is_empty() {
        println!("{}", cajas_diarias::report::NO_DATA);
        return Ok(());
    }

    println!("📈 Report {} → {}", query.from, query.to);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Sales:    ${:.2}", report.total_sales);
    println!("   Expenses: ${:.2}", report.total_expenses);
    println!("   Result:   ${:.2}", report.result);
    for subtotal in &report.by_branch {
        println!(
            "   • {:<20} sales ${:.2}  expenses ${:.2}  result ${:.2}",
            subtotal.branch, subtotal.sales, subtotal.expenses, subtotal.result
        );
    }

    if let Some(path) = out {
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        write_csv(&report, BufWriter::new(file))?;
        println!("✓ {} rows written to {}", report.rows.len(), path.display());
    }
    Ok(())
}

fn run_summary(conn: &Connection, config: &Config, branch_id: i64, date: Option<NaiveDate>) -> Result<()> {
    let today = config.today();
    let date = date.unwrap_or(today);
    let summary = daily_summary(conn, &operator(), branch_id, date, today)?;

    println!("📊 {} · {}", summary.branch_name, date.format(cajas_diarias::access::DISPLAY_DATE));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if summary.is_empty() {
        println!("   No movements recorded");
    }
    for row in &summary.rows {
        println!(
            "   {:<8} {:<18} {:<24} ${:>10.2}  {}",
            row.kind.as_str(),
            row.category,
            row.detail,
            row.amount,
            row.payment_method
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Sales:     ${:.2}", summary.sales_total);
    println!("   Expenses:  ${:.2}", summary.expenses_total);
    println!("   Net:       ${:.2}", summary.net);
    println!("   A Rendir:  ${:.2}", summary.cash_to_deliver);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_view(conn: &Connection, config: &Config, branch_id: i64, date: Option<NaiveDate>) -> Result<()> {
    let today = config.today();
    let mut app = ui::App::new(operator(), branch_id, date.unwrap_or(today), today);
    ui::run_ui(conn, &mut app)
}

#[cfg(not(feature = "tui"))]
fn run_view(_conn: &Connection, _config: &Config, _branch_id: i64, _date: Option<NaiveDate>) -> Result<()> {
    anyhow::bail!("TUI mode not available, rebuild with: cargo build --features tui")
}
