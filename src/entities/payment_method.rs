// 💳 Payment Method Entity - how the money moved (cash, card, transfer...)

use super::{parse_text_column, CategoryKind, CASH_METHOD};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    Sale,
    Expense,
    Both,
}

impl AppliesTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppliesTo::Sale => "sale",
            AppliesTo::Expense => "expense",
            AppliesTo::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sale" | "venta" => Some(AppliesTo::Sale),
            "expense" | "gasto" => Some(AppliesTo::Expense),
            "both" | "ambos" => Some(AppliesTo::Both),
            _ => None,
        }
    }

    pub fn covers(&self, kind: CategoryKind) -> bool {
        matches!(
            (self, kind),
            (AppliesTo::Both, _)
                | (AppliesTo::Sale, CategoryKind::Sale)
                | (AppliesTo::Expense, CategoryKind::Expense)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    pub name: String,
    pub applies_to: AppliesTo,
    pub active: bool,
    pub sort_order: i64,
}

impl PaymentMethod {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let applies_to: String = row.get(2)?;
        Ok(PaymentMethod {
            id: row.get(0)?,
            name: row.get(1)?,
            applies_to: parse_text_column(2, &applies_to, AppliesTo::parse)?,
            active: row.get(3)?,
            sort_order: row.get(4)?,
        })
    }
}

/// Active methods usable for `kind` (its own ones plus "both"), in display order
pub fn payment_methods_for(conn: &Connection, kind: CategoryKind) -> Result<Vec<PaymentMethod>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, applies_to, active, sort_order FROM payment_methods
         WHERE active = 1 AND (applies_to = ?1 OR applies_to = 'both')
         ORDER BY sort_order, name",
    )?;
    let methods = stmt
        .query_map([kind.as_str()], PaymentMethod::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(methods)
}

pub fn list_all_payment_methods(conn: &Connection) -> Result<Vec<PaymentMethod>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, applies_to, active, sort_order FROM payment_methods ORDER BY sort_order, id",
    )?;
    let methods = stmt
        .query_map([], PaymentMethod::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(methods)
}

pub fn get_payment_method(conn: &Connection, id: i64) -> Result<Option<PaymentMethod>> {
    let method = conn
        .query_row(
            "SELECT id, name, applies_to, active, sort_order FROM payment_methods WHERE id = ?1",
            [id],
            PaymentMethod::from_row,
        )
        .optional()?;
    Ok(method)
}

/// The active cash method, if it has not been removed
pub fn find_cash_method(conn: &Connection) -> Result<Option<PaymentMethod>> {
    let method = conn
        .query_row(
            "SELECT id, name, applies_to, active, sort_order FROM payment_methods
             WHERE name = ?1 AND active = 1",
            [CASH_METHOD],
            PaymentMethod::from_row,
        )
        .optional()?;
    Ok(method)
}

pub fn create_payment_method(
    conn: &Connection,
    name: &str,
    applies_to: AppliesTo,
    sort_order: i64,
) -> Result<PaymentMethod> {
    conn.execute(
        "INSERT INTO payment_methods (name, applies_to, active, sort_order) VALUES (?1, ?2, 1, ?3)",
        params![name, applies_to.as_str(), sort_order],
    )?;
    Ok(PaymentMethod {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        applies_to,
        active: true,
        sort_order,
    })
}

pub fn update_payment_method(
    conn: &Connection,
    id: i64,
    name: &str,
    applies_to: AppliesTo,
    active: bool,
    sort_order: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE payment_methods SET name = ?1, applies_to = ?2, active = ?3, sort_order = ?4 WHERE id = ?5",
        params![name, applies_to.as_str(), active, sort_order, id],
    )?;
    Ok(changed > 0)
}
