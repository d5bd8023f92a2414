// 💻 CRM Daily Figures - what the branch's POS/CRM says it sold
//
// One row per (branch, date). Saving again for the same pair overwrites.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmDaily {
    pub id: i64,
    pub branch_id: i64,
    pub date: NaiveDate,
    pub total_sales: f64,
    pub ticket_count: i64,
    pub recorded_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl CrmDaily {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CrmDaily {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            date: row.get(2)?,
            total_sales: row.get(3)?,
            ticket_count: row.get(4)?,
            recorded_by: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

pub fn find_crm_day(conn: &Connection, branch_id: i64, date: NaiveDate) -> Result<Option<CrmDaily>> {
    let row = conn
        .query_row(
            "SELECT id, branch_id, date, total_sales, ticket_count, recorded_by, updated_at
             FROM crm_daily WHERE branch_id = ?1 AND date = ?2",
            params![branch_id, date],
            CrmDaily::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Insert, or update the existing row for the same branch and date
pub fn upsert_crm_day(
    conn: &Connection,
    branch_id: i64,
    date: NaiveDate,
    total_sales: f64,
    ticket_count: i64,
    recorded_by: &str,
) -> Result<(i64, UpsertOutcome)> {
    let now = Utc::now();

    if let Some(existing) = find_crm_day(conn, branch_id, date)? {
        conn.execute(
            "UPDATE crm_daily
             SET total_sales = ?1, ticket_count = ?2, recorded_by = ?3, updated_at = ?4
             WHERE id = ?5",
            params![total_sales, ticket_count, recorded_by, now, existing.id],
        )?;
        return Ok((existing.id, UpsertOutcome::Updated));
    }

    conn.execute(
        "INSERT INTO crm_daily (branch_id, date, total_sales, ticket_count, recorded_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![branch_id, date, total_sales, ticket_count, recorded_by, now],
    )?;
    Ok((conn.last_insert_rowid(), UpsertOutcome::Created))
}

pub fn crm_in_range(conn: &Connection, branch_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<CrmDaily>> {
    let mut stmt = conn.prepare(
        "SELECT id, branch_id, date, total_sales, ticket_count, recorded_by, updated_at
         FROM crm_daily
         WHERE branch_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date",
    )?;
    let rows = stmt
        .query_map(params![branch_id, from, to], CrmDaily::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
