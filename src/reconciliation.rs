// ⚖️ Reconciliation Engine - register sales vs CRM sales
//
//   difference = register_total - crm_total
//   percentage = difference / crm_total * 100     (0 when there is no CRM data)
//
// Diagnosis (first match wins):
//   crm_total == 0                   → NoCrmData
//   |difference| < balanced          → Balanced
//   |difference| < minor% of crm     → MinorDifference
//   otherwise                        → SignificantDifference

use crate::access::require_admin;
use crate::auth::User;
use crate::db::log_event;
use crate::entities::{branch, crm, movement, CrmDaily, Movement, MovementKind, UpsertOutcome};
use crate::error::CajaError;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// DIAGNOSIS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    NoCrmData,
    Balanced,
    MinorDifference,
    SignificantDifference,
}

impl Diagnosis {
    pub fn message(&self) -> &'static str {
        match self {
            Diagnosis::NoCrmData => "No CRM data loaded for this period",
            Diagnosis::Balanced => "Register and CRM match",
            Diagnosis::MinorDifference => "Minor difference (under 1%)",
            Diagnosis::SignificantDifference => "Significant difference, review the period",
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayComparison {
    pub date: NaiveDate,
    pub register_total: f64,
    pub crm_total: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub branch_id: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub register_total: f64,
    pub crm_total: f64,
    pub days_with_crm_data: usize,
    pub difference: f64,
    pub percentage: f64,
    pub diagnosis: Diagnosis,
    pub highlight: bool,
    /// Newest first
    pub days: Vec<DayComparison>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation {} → {}: register ${:.2}, CRM ${:.2} ({} days), difference ${:.2} ({:.2}%) - {}",
            self.from,
            self.to,
            self.register_total,
            self.crm_total,
            self.days_with_crm_data,
            self.difference,
            self.percentage,
            self.diagnosis.message()
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciliationEngine {
    /// Below this absolute difference the period is balanced (default: $100)
    pub balanced_threshold: f64,

    /// Below this share of the CRM total the difference is minor (default: 1%)
    pub minor_ratio: f64,

    /// Above this absolute difference the result is highlighted (default: $1000)
    pub highlight_threshold: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            balanced_threshold: 100.0,
            minor_ratio: 0.01,
            highlight_threshold: 1000.0,
        }
    }

    pub fn with_thresholds(balanced_threshold: f64, minor_ratio: f64, highlight_threshold: f64) -> Self {
        ReconciliationEngine {
            balanced_threshold,
            minor_ratio,
            highlight_threshold,
        }
    }

    pub fn diagnose(&self, difference: f64, crm_total: f64) -> Diagnosis {
        let abs = difference.abs();
        if crm_total == 0.0 {
            Diagnosis::NoCrmData
        } else if abs < self.balanced_threshold {
            Diagnosis::Balanced
        } else if abs < crm_total * self.minor_ratio {
            Diagnosis::MinorDifference
        } else {
            Diagnosis::SignificantDifference
        }
    }

    /// Compare register movements against CRM rows for the same branch/period.
    /// Only sales count on the register side.
    pub fn reconcile(
        &self,
        branch_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        movements: &[Movement],
        crm_days: &[CrmDaily],
    ) -> ReconciliationReport {
        let mut per_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

        let mut register_total = 0.0;
        for m in movements.iter().filter(|m| m.kind == MovementKind::Sale) {
            register_total += m.amount;
            per_day.entry(m.date).or_insert((0.0, 0.0)).0 += m.amount;
        }

        let mut crm_total = 0.0;
        for day in crm_days {
            crm_total += day.total_sales;
            per_day.entry(day.date).or_insert((0.0, 0.0)).1 += day.total_sales;
        }

        let difference = register_total - crm_total;
        let percentage = if crm_total > 0.0 {
            difference / crm_total * 100.0
        } else {
            0.0
        };

        let days = per_day
            .into_iter()
            .rev()
            .map(|(date, (register, crm))| DayComparison {
                date,
                register_total: register,
                crm_total: crm,
                difference: register - crm,
            })
            .collect();

        ReconciliationReport {
            branch_id,
            from,
            to,
            register_total,
            crm_total,
            days_with_crm_data: crm_days.len(),
            difference,
            percentage,
            diagnosis: self.diagnose(difference, crm_total),
            highlight: difference.abs() > self.highlight_threshold,
            days,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Load both sides from the database and reconcile them (admin only)
pub fn reconcile_branch(
    conn: &Connection,
    user: &User,
    engine: &ReconciliationEngine,
    branch_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<ReconciliationReport> {
    require_admin(user)?;
    if from > to {
        return Err(CajaError::validation("'From' must not be after 'To'").into());
    }
    if branch::get_branch(conn, branch_id)?.is_none() {
        return Err(CajaError::not_found(format!("Branch {branch_id} does not exist")).into());
    }

    let movements = movement::movements_in_range(conn, from, to, Some(branch_id))?;
    let crm_days = crm::crm_in_range(conn, branch_id, from, to)?;
    let report = engine.reconcile(branch_id, from, to, &movements, &crm_days);

    tracing::info!(branch_id, diagnosis = ?report.diagnosis, "{}", report.summary());
    Ok(report)
}

// ============================================================================
// CRM ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmForm {
    pub branch_id: i64,
    pub date: NaiveDate,
    pub total_sales: f64,
    pub ticket_count: i64,
}

/// Store the CRM figures of a branch/day (admin only). Saving twice updates.
pub fn save_crm_day(conn: &Connection, user: &User, form: &CrmForm) -> Result<(i64, UpsertOutcome)> {
    require_admin(user)?;
    if !form.total_sales.is_finite() || form.total_sales < 0.0 {
        return Err(CajaError::validation("Total sales must be zero or more").into());
    }
    if form.ticket_count < 0 {
        return Err(CajaError::validation("Ticket count must be zero or more").into());
    }
    if branch::get_branch(conn, form.branch_id)?.is_none() {
        return Err(CajaError::not_found(format!("Branch {} does not exist", form.branch_id)).into());
    }

    let (id, outcome) = crm::upsert_crm_day(
        conn,
        form.branch_id,
        form.date,
        form.total_sales,
        form.ticket_count,
        &user.full_name,
    )?;

    log_event(
        conn,
        match outcome {
            UpsertOutcome::Created => "crm_day_created",
            UpsertOutcome::Updated => "crm_day_updated",
        },
        "crm_daily",
        &id.to_string(),
        serde_json::json!({
            "branch_id": form.branch_id,
            "date": form.date,
            "total_sales": form.total_sales,
            "ticket_count": form.ticket_count,
        }),
        &user.email,
    );

    Ok((id, outcome))
}

// ============================================================================
// TESTS
// ============================================================================
