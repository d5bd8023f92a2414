// 🏪 Branch Entity - a physical store location

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub active: bool,

    /// Name of the POS/CRM system this branch reports from (if any)
    pub crm_system: Option<String>,
}

impl Branch {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Branch {
            id: row.get(0)?,
            name: row.get(1)?,
            active: row.get(2)?,
            crm_system: row.get(3)?,
        })
    }
}

/// Active branches ordered by name
pub fn list_active_branches(conn: &Connection) -> Result<Vec<Branch>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, active, crm_system FROM branches WHERE active = 1 ORDER BY name",
    )?;
    let branches = stmt
        .query_map([], Branch::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(branches)
}

/// Every branch, inactive included (maintenance view)
pub fn list_all_branches(conn: &Connection) -> Result<Vec<Branch>> {
    let mut stmt = conn.prepare("SELECT id, name, active, crm_system FROM branches ORDER BY id DESC")?;
    let branches = stmt
        .query_map([], Branch::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(branches)
}

pub fn get_branch(conn: &Connection, id: i64) -> Result<Option<Branch>> {
    let branch = conn
        .query_row(
            "SELECT id, name, active, crm_system FROM branches WHERE id = ?1",
            [id],
            Branch::from_row,
        )
        .optional()?;
    Ok(branch)
}

pub fn create_branch(conn: &Connection, name: &str) -> Result<Branch> {
    conn.execute("INSERT INTO branches (name, active) VALUES (?1, 1)", [name])?;
    let id = conn.last_insert_rowid();
    Ok(Branch {
        id,
        name: name.to_string(),
        active: true,
        crm_system: None,
    })
}

/// Rename / (de)activate an existing branch. Returns false when the id is unknown.
pub fn update_branch(conn: &Connection, id: i64, name: &str, active: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE branches SET name = ?1, active = ?2 WHERE id = ?3",
        params![name, active, id],
    )?;
    Ok(changed > 0)
}

pub fn set_crm_system(conn: &Connection, id: i64, system: Option<&str>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE branches SET crm_system = ?1 WHERE id = ?2",
        params![system, id],
    )?;
    Ok(changed > 0)
}
