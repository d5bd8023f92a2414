// 💰 Movement Entity - one line of a branch's daily cash register
//
// Three kinds:
//   sale     → money in, any sale payment method
//   expense  → money out, always cash
//   payroll  → money out, always cash, category "Sueldos", names an employee
//
// Rows are read joined with branch/category/method names so summaries and
// reports never need a second lookup.

use super::{parse_text_column, CategoryKind};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// MOVEMENT KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    Expense,
    Payroll,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Sale => "sale",
            MovementKind::Expense => "expense",
            MovementKind::Payroll => "payroll",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sale" | "venta" => Some(MovementKind::Sale),
            "expense" | "gasto" => Some(MovementKind::Expense),
            "payroll" | "sueldos" => Some(MovementKind::Payroll),
            _ => None,
        }
    }

    /// Which category list this kind draws from
    pub fn category_kind(&self) -> CategoryKind {
        match self {
            MovementKind::Sale => CategoryKind::Sale,
            MovementKind::Expense | MovementKind::Payroll => CategoryKind::Expense,
        }
    }

    /// Expenses and payroll both take money out of the register
    pub fn is_outflow(&self) -> bool {
        !matches!(self, MovementKind::Sale)
    }
}

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: i64,
    pub branch_id: i64,
    pub branch_name: String,
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub category_id: i64,
    pub category_name: String,
    pub payment_method_id: i64,
    pub payment_method_name: String,
    pub amount: f64,
    pub concept: String,
    pub employee_name: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

/// A validated movement ready to be stored (see entry.rs)
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub branch_id: i64,
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub category_id: i64,
    pub payment_method_id: i64,
    pub amount: f64,
    pub concept: String,
    pub employee_name: Option<String>,
    pub recorded_by: String,
}

/// Admin correction of an existing movement; None leaves the field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementUpdate {
    pub amount: Option<f64>,
    pub concept: Option<String>,
    pub date: Option<NaiveDate>,
}

const SELECT_MOVEMENT: &str = "
    SELECT m.id, m.branch_id, b.name, m.date, m.kind,
           m.category_id, c.name, m.payment_method_id, p.name,
           m.amount, m.concept, m.employee_name, m.recorded_by, m.created_at
    FROM movements m
    JOIN branches b ON b.id = m.branch_id
    JOIN categories c ON c.id = m.category_id
    JOIN payment_methods p ON p.id = m.payment_method_id";

impl Movement {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(4)?;
        Ok(Movement {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            branch_name: row.get(2)?,
            date: row.get(3)?,
            kind: parse_text_column(4, &kind, MovementKind::parse)?,
            category_id: row.get(5)?,
            category_name: row.get(6)?,
            payment_method_id: row.get(7)?,
            payment_method_name: row.get(8)?,
            amount: row.get(9)?,
            concept: row.get(10)?,
            employee_name: row.get(11)?,
            recorded_by: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    /// What the detail tables show in the "concept" column
    pub fn detail(&self) -> &str {
        match (&self.kind, &self.employee_name) {
            (MovementKind::Payroll, Some(name)) => name,
            _ => &self.concept,
        }
    }
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn insert_movement(conn: &Connection, movement: &NewMovement) -> Result<i64> {
    conn.execute(
        "INSERT INTO movements (
            branch_id, date, kind, category_id, payment_method_id,
            amount, concept, employee_name, recorded_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            movement.branch_id,
            movement.date,
            movement.kind.as_str(),
            movement.category_id,
            movement.payment_method_id,
            movement.amount,
            movement.concept,
            movement.employee_name,
            movement.recorded_by,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_movement(conn: &Connection, id: i64) -> Result<Option<Movement>> {
    let sql = format!("{SELECT_MOVEMENT} WHERE m.id = ?1");
    let movement = conn.query_row(&sql, [id], Movement::from_row).optional()?;
    Ok(movement)
}

/// Everything one branch recorded on one date, in entry order
pub fn movements_for_day(conn: &Connection, branch_id: i64, date: NaiveDate) -> Result<Vec<Movement>> {
    let sql = format!("{SELECT_MOVEMENT} WHERE m.branch_id = ?1 AND m.date = ?2 ORDER BY m.id");
    let mut stmt = conn.prepare(&sql)?;
    let movements = stmt
        .query_map(params![branch_id, date], Movement::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

/// Movements in [from, to], optionally restricted to one branch
pub fn movements_in_range(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    branch_id: Option<i64>,
) -> Result<Vec<Movement>> {
    let sql = format!(
        "{SELECT_MOVEMENT}
         WHERE m.date >= ?1 AND m.date <= ?2 AND (?3 IS NULL OR m.branch_id = ?3)
         ORDER BY m.date, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let movements = stmt
        .query_map(params![from, to, branch_id], Movement::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

/// Newest first, capped (maintenance listing)
pub fn latest_movements(conn: &Connection, limit: usize) -> Result<Vec<Movement>> {
    let sql = format!("{SELECT_MOVEMENT} ORDER BY m.id DESC LIMIT ?1");
    let mut stmt = conn.prepare(&sql)?;
    let movements = stmt
        .query_map([limit as i64], Movement::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(movements)
}

pub fn update_movement(conn: &Connection, id: i64, update: &MovementUpdate) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE movements SET
            amount = COALESCE(?1, amount),
            concept = COALESCE(?2, concept),
            date = COALESCE(?3, date)
         WHERE id = ?4",
        params![update.amount, update.concept, update.date, id],
    )?;
    Ok(changed > 0)
}

pub fn delete_movement(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM movements WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::entities::{branch, category, payment_method};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_sale(branch_id: i64, category_id: i64, method_id: i64, on: NaiveDate, amount: f64) -> NewMovement {
        NewMovement {
            branch_id,
            date: on,
            kind: MovementKind::Sale,
            category_id,
            payment_method_id: method_id,
            amount,
            concept: String::new(),
            employee_name: None,
            recorded_by: "Test User".to_string(),
        }
    }

    #[test]
    fn test_kind_vocabulary() {
        assert_eq!(MovementKind::parse("Sueldos"), Some(MovementKind::Payroll));
        assert_eq!(MovementKind::parse("venta"), Some(MovementKind::Sale));
        assert_eq!(MovementKind::Payroll.category_kind(), CategoryKind::Expense);
        assert!(MovementKind::Payroll.is_outflow());
        assert!(!MovementKind::Sale.is_outflow());
    }

    #[test]
    fn test_insert_and_read_back_joined() {
        let conn = open_in_memory().unwrap();
        let centro = branch::create_branch(&conn, "Centro").unwrap();
        let mostrador = category::create_category(&conn, "Mostrador", CategoryKind::Sale).unwrap();
        let cash = payment_method::find_cash_method(&conn).unwrap().unwrap();

        let id = insert_movement(&conn, &new_sale(centro.id, mostrador.id, cash.id, date(2025, 3, 10), 1500.0)).unwrap();

        let movement = get_movement(&conn, id).unwrap().unwrap();
        assert_eq!(movement.branch_name, "Centro");
        assert_eq!(movement.category_name, "Mostrador");
        assert_eq!(movement.payment_method_name, "Efectivo");
        assert_eq!(movement.date, date(2025, 3, 10));
        assert_eq!(movement.amount, 1500.0);
    }

    #[test]
    fn test_range_filters_dates_and_branch() {
        let conn = open_in_memory().unwrap();
        let centro = branch::create_branch(&conn, "Centro").unwrap();
        let norte = branch::create_branch(&conn, "Norte").unwrap();
        let cat = category::create_category(&conn, "Mostrador", CategoryKind::Sale).unwrap();
        let cash = payment_method::find_cash_method(&conn).unwrap().unwrap();

        insert_movement(&conn, &new_sale(centro.id, cat.id, cash.id, date(2025, 2, 28), 10.0)).unwrap();
        insert_movement(&conn, &new_sale(centro.id, cat.id, cash.id, date(2025, 3, 1), 20.0)).unwrap();
        insert_movement(&conn, &new_sale(norte.id, cat.id, cash.id, date(2025, 3, 15), 30.0)).unwrap();
        insert_movement(&conn, &new_sale(centro.id, cat.id, cash.id, date(2025, 3, 31), 40.0)).unwrap();
        insert_movement(&conn, &new_sale(centro.id, cat.id, cash.id, date(2025, 4, 1), 50.0)).unwrap();

        let all_march = movements_in_range(&conn, date(2025, 3, 1), date(2025, 3, 31), None).unwrap();
        let amounts: Vec<f64> = all_march.iter().map(|m| m.amount).collect();
        assert_eq!(amounts, vec![20.0, 30.0, 40.0]);

        let centro_march = movements_in_range(&conn, date(2025, 3, 1), date(2025, 3, 31), Some(centro.id)).unwrap();
        assert_eq!(centro_march.len(), 2);
    }

    #[test]
    fn test_update_and_delete() {
        let conn = open_in_memory().unwrap();
        let centro = branch::create_branch(&conn, "Centro").unwrap();
        let cat = category::create_category(&conn, "Mostrador", CategoryKind::Sale).unwrap();
        let cash = payment_method::find_cash_method(&conn).unwrap().unwrap();
        let id = insert_movement(&conn, &new_sale(centro.id, cat.id, cash.id, date(2025, 3, 1), 10.0)).unwrap();

        let update = MovementUpdate {
            amount: Some(12.5),
            ..Default::default()
        };
        assert!(update_movement(&conn, id, &update).unwrap());

        let movement = get_movement(&conn, id).unwrap().unwrap();
        assert_eq!(movement.amount, 12.5);
        assert_eq!(movement.date, date(2025, 3, 1));

        assert!(delete_movement(&conn, id).unwrap());
        assert!(get_movement(&conn, id).unwrap().is_none());
        assert!(!delete_movement(&conn, id).unwrap());
    }

    #[test]
    fn test_payroll_detail_shows_employee() {
        let conn = open_in_memory().unwrap();
        let centro = branch::create_branch(&conn, "Centro").unwrap();
        let payroll = category::find_active_by_name(&conn, CategoryKind::Expense, "Sueldos")
            .unwrap()
            .unwrap();
        let cash = payment_method::find_cash_method(&conn).unwrap().unwrap();

        let id = insert_movement(
            &conn,
            &NewMovement {
                kind: MovementKind::Payroll,
                employee_name: Some("Juan Pérez".to_string()),
                ..new_sale(centro.id, payroll.id, cash.id, date(2025, 3, 1), 80000.0)
            },
        )
        .unwrap();

        let movement = get_movement(&conn, id).unwrap().unwrap();
        assert_eq!(movement.detail(), "Juan Pérez");
    }
}
