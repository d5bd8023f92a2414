// 📊 Daily Summary - one branch, one day
//
//   sales_total      = Σ sales
//   expenses_total   = Σ expenses + Σ payroll
//   net              = sales_total - expenses_total
//   cash_sales       = Σ sales paid in cash
//   cash_outflows    = Σ expenses/payroll paid in cash
//   cash_to_deliver  = cash_sales - cash_outflows      ("A Rendir")

use crate::access::{check_date, require_branch};
use crate::auth::User;
use crate::entities::{branch, movement, Movement, MovementKind, CASH_METHOD};
use crate::error::CajaError;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub name: String,
    pub total: f64,
}

/// Row of the detail table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailRow {
    pub id: i64,
    pub kind: MovementKind,
    pub category: String,
    pub detail: String,
    pub amount: f64,
    pub payment_method: String,
    pub recorded_by: String,
}

impl From<&Movement> for DetailRow {
    fn from(m: &Movement) -> Self {
        DetailRow {
            id: m.id,
            kind: m.kind,
            category: m.category_name.clone(),
            detail: m.detail().to_string(),
            amount: m.amount,
            payment_method: m.payment_method_name.clone(),
            recorded_by: m.recorded_by.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub branch_id: i64,
    pub branch_name: String,
    pub date: NaiveDate,
    pub sales_total: f64,
    pub expenses_total: f64,
    pub payroll_total: f64,
    pub net: f64,
    pub cash_sales: f64,
    pub cash_outflows: f64,
    pub cash_to_deliver: f64,
    pub sales_by_payment_method: Vec<GroupTotal>,
    pub expenses_by_category: Vec<GroupTotal>,
    pub rows: Vec<DetailRow>,
}

impl DailySummary {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn grouped(totals: BTreeMap<String, f64>) -> Vec<GroupTotal> {
    totals
        .into_iter()
        .map(|(name, total)| GroupTotal { name, total })
        .collect()
}

/// Pure aggregation over already-fetched rows
pub fn summarize(branch_id: i64, branch_name: &str, date: NaiveDate, movements: &[Movement]) -> DailySummary {
    let mut sales_total = 0.0;
    let mut expenses_total = 0.0;
    let mut payroll_total = 0.0;
    let mut cash_sales = 0.0;
    let mut cash_outflows = 0.0;
    let mut by_method: BTreeMap<String, f64> = BTreeMap::new();
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();

    for m in movements {
        let is_cash = m.payment_method_name == CASH_METHOD;
        match m.kind {
            MovementKind::Sale => {
                sales_total += m.amount;
                if is_cash {
                    cash_sales += m.amount;
                }
                *by_method.entry(m.payment_method_name.clone()).or_insert(0.0) += m.amount;
            }
            MovementKind::Expense | MovementKind::Payroll => {
                expenses_total += m.amount;
                if m.kind == MovementKind::Payroll {
                    payroll_total += m.amount;
                }
                if is_cash {
                    cash_outflows += m.amount;
                }
                *by_category.entry(m.category_name.clone()).or_insert(0.0) += m.amount;
            }
        }
    }

    DailySummary {
        branch_id,
        branch_name: branch_name.to_string(),
        date,
        sales_total,
        expenses_total,
        payroll_total,
        net: sales_total - expenses_total,
        cash_sales,
        cash_outflows,
        cash_to_deliver: cash_sales - cash_outflows,
        sales_by_payment_method: grouped(by_method),
        expenses_by_category: grouped(by_category),
        rows: movements.iter().map(DetailRow::from).collect(),
    }
}

/// Summary for `user`, enforcing the same branch/date rules as entry
pub fn daily_summary(
    conn: &Connection,
    user: &User,
    branch_id: i64,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<DailySummary> {
    require_branch(user, branch_id)?;
    check_date(user.role, date, today)?;

    let target = branch::get_branch(conn, branch_id)?
        .ok_or_else(|| CajaError::not_found(format!("Branch {branch_id} does not exist")))?;

    let movements = movement::movements_for_day(conn, branch_id, date)?;
    Ok(summarize(target.id, &target.name, date, &movements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use chrono::Utc;

    fn mv(id: i64, kind: MovementKind, category: &str, method: &str, amount: f64) -> Movement {
        Movement {
            id,
            branch_id: 1,
            branch_name: "Suc01".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            kind,
            category_id: 1,
            category_name: category.to_string(),
            payment_method_id: 1,
            payment_method_name: method.to_string(),
            amount,
            concept: String::new(),
            employee_name: None,
            recorded_by: "Test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cash_to_deliver() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let rows = vec![
            mv(1, MovementKind::Sale, "Mostrador", "Efectivo", 10000.0),
            mv(2, MovementKind::Sale, "Mostrador", "Tarjeta", 4000.0),
            mv(3, MovementKind::Sale, "Delivery", "Efectivo", 2500.0),
            mv(4, MovementKind::Expense, "Limpieza", "Efectivo", 1200.0),
            mv(5, MovementKind::Payroll, "Sueldos", "Efectivo", 3000.0),
        ];

        let summary = summarize(1, "Suc01", day, &rows);

        assert_eq!(summary.sales_total, 16500.0);
        assert_eq!(summary.expenses_total, 4200.0);
        assert_eq!(summary.payroll_total, 3000.0);
        assert_eq!(summary.net, 12300.0);
        assert_eq!(summary.cash_sales, 12500.0);
        assert_eq!(summary.cash_outflows, 4200.0);
        assert_eq!(summary.cash_to_deliver, 8300.0);
    }

    #[test]
    fn test_non_cash_outflow_does_not_reduce_cash_to_deliver() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let rows = vec![
            mv(1, MovementKind::Sale, "Mostrador", "Efectivo", 1000.0),
            mv(2, MovementKind::Expense, "Proveedores", "Transferencia", 400.0),
        ];
        let summary = summarize(1, "Suc01", day, &rows);
        assert_eq!(summary.expenses_total, 400.0);
        assert_eq!(summary.cash_to_deliver, 1000.0);
    }

    #[test]
    fn test_groupings_sorted_by_name() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let rows = vec![
            mv(1, MovementKind::Sale, "Mostrador", "Tarjeta", 100.0),
            mv(2, MovementKind::Sale, "Mostrador", "Efectivo", 50.0),
            mv(3, MovementKind::Sale, "Mostrador", "Tarjeta", 25.0),
            mv(4, MovementKind::Expense, "Limpieza", "Efectivo", 10.0),
        ];
        let summary = summarize(1, "Suc01", day, &rows);
        assert_eq!(
            summary.sales_by_payment_method,
            vec![
                GroupTotal { name: "Efectivo".to_string(), total: 50.0 },
                GroupTotal { name: "Tarjeta".to_string(), total: 125.0 },
            ]
        );
        assert_eq!(summary.expenses_by_category.len(), 1);
    }

    #[test]
    fn test_empty_day_is_zeroed() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let summary = summarize(1, "Suc01", day, &[]);
        assert!(summary.is_empty());
        assert_eq!(summary.cash_to_deliver, 0.0);
        assert_eq!(summary.net, 0.0);
    }

    #[test]
    fn test_branch_manager_restricted_to_own_branch_and_recent_dates() {
        let conn = crate::db::open_in_memory().unwrap();
        let own = branch::create_branch(&conn, "Suc01").unwrap();
        let other = branch::create_branch(&conn, "Suc02").unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let manager = User {
            id: "m".to_string(),
            email: "m@cajas.local".to_string(),
            full_name: "M".to_string(),
            role: Role::BranchManager,
            branch_id: Some(own.id),
        };

        assert!(daily_summary(&conn, &manager, own.id, today, today).is_ok());
        assert!(daily_summary(&conn, &manager, own.id, today.pred_opt().unwrap(), today).is_ok());
        assert!(daily_summary(&conn, &manager, other.id, today, today).is_err());
        assert!(daily_summary(&conn, &manager, own.id, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), today).is_err());
    }
}
