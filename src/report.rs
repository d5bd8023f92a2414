// 📈 Range Report - movements over a period, optionally every branch
// Admin only. KPIs + per-branch subtotals + CSV export.

use crate::access::require_admin;
use crate::auth::User;
use crate::entities::{movement, Movement, MovementKind};
use crate::error::CajaError;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

pub const NO_DATA: &str = "No data found for that period";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchScope {
    One(i64),
    All,
}

impl BranchScope {
    fn branch_id(&self) -> Option<i64> {
        match self {
            BranchScope::One(id) => Some(*id),
            BranchScope::All => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub scope: BranchScope,
}

impl ReportQuery {
    /// First of the current month through today
    pub fn month_to_date(today: NaiveDate, scope: BranchScope) -> Self {
        ReportQuery {
            from: today.with_day(1).unwrap_or(today),
            to: today,
            scope,
        }
    }
}

/// One CSV / detail line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub branch: String,
    pub kind: &'static str,
    pub category: String,
    pub concept: String,
    pub amount: f64,
    pub payment_method: String,
    pub recorded_by: String,
}

impl From<&Movement> for ReportRow {
    fn from(m: &Movement) -> Self {
        ReportRow {
            date: m.date,
            branch: m.branch_name.clone(),
            kind: m.kind.as_str(),
            category: m.category_name.clone(),
            concept: m.detail().to_string(),
            amount: m.amount,
            payment_method: m.payment_method_name.clone(),
            recorded_by: m.recorded_by.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSubtotal {
    pub branch: String,
    pub sales: f64,
    pub expenses: f64,
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeReport {
    pub query: ReportQuery,
    pub total_sales: f64,
    pub total_expenses: f64,
    pub result: f64,
    pub by_branch: Vec<BranchSubtotal>,
    pub rows: Vec<ReportRow>,
}

impl RangeReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn build_report(query: ReportQuery, movements: &[Movement]) -> RangeReport {
    let mut total_sales = 0.0;
    let mut total_expenses = 0.0;
    let mut branches: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for m in movements {
        let entry = branches.entry(m.branch_name.clone()).or_insert((0.0, 0.0));
        if m.kind == MovementKind::Sale {
            total_sales += m.amount;
            entry.0 += m.amount;
        } else {
            total_expenses += m.amount;
            entry.1 += m.amount;
        }
    }

    RangeReport {
        query,
        total_sales,
        total_expenses,
        result: total_sales - total_expenses,
        by_branch: branches
            .into_iter()
            .map(|(branch, (sales, expenses))| BranchSubtotal {
                branch,
                sales,
                expenses,
                result: sales - expenses,
            })
            .collect(),
        rows: movements.iter().map(ReportRow::from).collect(),
    }
}

/// Query + aggregate. An empty period is returned as an empty report.
pub fn range_report(conn: &Connection, user: &User, query: ReportQuery) -> Result<RangeReport> {
    require_admin(user)?;
    if query.from > query.to {
        return Err(CajaError::validation("'From' must not be after 'To'").into());
    }

    let movements = movement::movements_in_range(conn, query.from, query.to, query.scope.branch_id())?;
    tracing::info!(
        from = %query.from,
        to = %query.to,
        rows = movements.len(),
        "range report generated"
    );
    Ok(build_report(query, &movements))
}

/// Write the detail rows as CSV (header + one line per movement)
pub fn write_csv<W: Write>(report: &RangeReport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if report.rows.is_empty() {
        // serialize() only emits the header alongside the first record
        wtr.write_record([
            "date",
            "branch",
            "kind",
            "category",
            "concept",
            "amount",
            "payment_method",
            "recorded_by",
        ])?;
    }
    for row in &report.rows {
        wtr.serialize(row).context("Failed to write CSV row")?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_bytes(report: &RangeReport) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_csv(report, &mut buf)?;
    Ok(buf)
}
