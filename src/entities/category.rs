// 🏷️ Category Entity - what a movement is about
//
// Categories are split by kind: sale categories feed the sales side,
// expense categories the expense side. "Sueldos" is an expense category
// reserved for payroll entries and hidden from the manual expense list.

use super::{parse_text_column, PAYROLL_CATEGORY};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

// ============================================================================
// CATEGORY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// Money coming in
    Sale,

    /// Money going out (payroll included)
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Sale => "sale",
            CategoryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sale" | "venta" => Some(CategoryKind::Sale),
            "expense" | "gasto" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    pub active: bool,
}

impl Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(2)?;
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: parse_text_column(2, &kind, CategoryKind::parse)?,
            active: row.get(3)?,
        })
    }

    pub fn is_payroll(&self) -> bool {
        self.kind == CategoryKind::Expense && self.name == PAYROLL_CATEGORY
    }
}

/// Active categories of one kind, ordered by name
pub fn list_categories(conn: &Connection, kind: CategoryKind) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, active FROM categories
         WHERE kind = ?1 AND active = 1
         ORDER BY name",
    )?;
    let categories = stmt
        .query_map([kind.as_str()], Category::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

/// Options a form should offer: payroll is entered through its own form
pub fn categories_for_form(conn: &Connection, kind: CategoryKind) -> Result<Vec<Category>> {
    let categories = list_categories(conn, kind)?
        .into_iter()
        .filter(|c| !c.is_payroll())
        .collect();
    Ok(categories)
}

pub fn list_all_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, kind, active FROM categories ORDER BY id DESC")?;
    let categories = stmt
        .query_map([], Category::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, kind, active FROM categories WHERE id = ?1",
            [id],
            Category::from_row,
        )
        .optional()?;
    Ok(category)
}

/// Active category by exact name within a kind
pub fn find_active_by_name(conn: &Connection, kind: CategoryKind, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, kind, active FROM categories
             WHERE kind = ?1 AND name = ?2 AND active = 1",
            params![kind.as_str(), name],
            Category::from_row,
        )
        .optional()?;
    Ok(category)
}

pub fn create_category(conn: &Connection, name: &str, kind: CategoryKind) -> Result<Category> {
    conn.execute(
        "INSERT INTO categories (name, kind, active) VALUES (?1, ?2, 1)",
        params![name, kind.as_str()],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        kind,
        active: true,
    })
}

pub fn update_category(conn: &Connection, id: i64, name: &str, kind: CategoryKind, active: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE categories SET name = ?1, kind = ?2, active = ?3 WHERE id = ?4",
        params![name, kind.as_str(), active, id],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// TESTS
// ============================================================================
