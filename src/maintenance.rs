// 🔧 Maintenance - admin upkeep of catalogs and movement corrections
//
// Every change is recorded in the events table.

use crate::access::require_admin;
use crate::auth::User;
use crate::db::log_event;
use crate::entities::{
    branch, category, movement, payment_method, AppliesTo, Branch, Category, CategoryKind, Movement,
    MovementUpdate, PaymentMethod,
};
use crate::error::CajaError;
use anyhow::Result;
use rusqlite::{ffi, Connection, ErrorCode};
use serde::{Deserialize, Serialize};

/// Movements shown by the maintenance listing
pub const LATEST_MOVEMENTS_LIMIT: usize = 200;

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchForm {
    /// None creates a new branch
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Absent leaves the stored value alone; `null` or blank clears it
    #[serde(default, deserialize_with = "present_field", skip_serializing_if = "Option::is_none")]
    pub crm_system: Option<Option<String>>,
}

/// Tells an absent field (outer None) from an explicit `null` (Some(None))
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub kind: CategoryKind,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodForm {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub applies_to: AppliesTo,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub sort_order: i64,
}

fn clean_name(name: &str) -> Result<String, CajaError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CajaError::validation("Name is required"));
    }
    Ok(name.to_string())
}

/// UNIQUE violations become a readable validation error; other constraint failures pass through
fn map_duplicate(err: anyhow::Error, name: &str) -> anyhow::Error {
    let duplicate = matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    );
    if duplicate {
        CajaError::validation(format!("'{name}' already exists")).into()
    } else {
        err
    }
}

// ============================================================================
// CATALOGS
// ============================================================================

pub fn save_branch(conn: &Connection, user: &User, form: &BranchForm) -> Result<Branch> {
    require_admin(user)?;
    let name = clean_name(&form.name)?;

    let id = match form.id {
        Some(id) => {
            if !branch::update_branch(conn, id, &name, form.active).map_err(|e| map_duplicate(e, &name))? {
                return Err(CajaError::not_found(format!("Branch {id} does not exist")).into());
            }
            id
        }
        None => {
            let created = branch::create_branch(conn, &name).map_err(|e| map_duplicate(e, &name))?;
            if !form.active {
                branch::update_branch(conn, created.id, &name, false)?;
            }
            created.id
        }
    };

    if let Some(requested) = &form.crm_system {
        let crm_system = requested.as_deref().map(str::trim).filter(|s| !s.is_empty());
        branch::set_crm_system(conn, id, crm_system)?;
    }

    let saved = branch::get_branch(conn, id)?
        .ok_or_else(|| CajaError::not_found(format!("Branch {id} does not exist")))?;

    log_event(
        conn,
        if form.id.is_some() { "branch_updated" } else { "branch_created" },
        "branch",
        &id.to_string(),
        serde_json::json!({ "name": saved.name, "active": saved.active, "crm_system": saved.crm_system }),
        &user.email,
    );

    Ok(saved)
}

pub fn list_branches(conn: &Connection, user: &User) -> Result<Vec<Branch>> {
    require_admin(user)?;
    branch::list_all_branches(conn)
}

pub fn list_categories(conn: &Connection, user: &User) -> Result<Vec<Category>> {
    require_admin(user)?;
    category::list_all_categories(conn)
}

pub fn list_payment_methods(conn: &Connection, user: &User) -> Result<Vec<PaymentMethod>> {
    require_admin(user)?;
    payment_method::list_all_payment_methods(conn)
}

pub fn save_category(conn: &Connection, user: &User, form: &CategoryForm) -> Result<Category> {
    require_admin(user)?;
    let name = clean_name(&form.name)?;

    let id = match form.id {
        Some(id) => {
            if !category::update_category(conn, id, &name, form.kind, form.active)
                .map_err(|e| map_duplicate(e, &name))?
            {
                return Err(CajaError::not_found(format!("Category {id} does not exist")).into());
            }
            id
        }
        None => {
            let created = category::create_category(conn, &name, form.kind).map_err(|e| map_duplicate(e, &name))?;
            if !form.active {
                category::update_category(conn, created.id, &name, form.kind, false)?;
            }
            created.id
        }
    };

    log_event(
        conn,
        if form.id.is_some() { "category_updated" } else { "category_created" },
        "category",
        &id.to_string(),
        serde_json::json!({ "name": name, "kind": form.kind.as_str(), "active": form.active }),
        &user.email,
    );

    category::get_category(conn, id)?
        .ok_or_else(|| CajaError::not_found(format!("Category {id} does not exist")).into())
}

pub fn save_payment_method(conn: &Connection, user: &User, form: &PaymentMethodForm) -> Result<PaymentMethod> {
    require_admin(user)?;
    let name = clean_name(&form.name)?;

    let id = match form.id {
        Some(id) => {
            if !payment_method::update_payment_method(conn, id, &name, form.applies_to, form.active, form.sort_order)
                .map_err(|e| map_duplicate(e, &name))?
            {
                return Err(CajaError::not_found(format!("Payment method {id} does not exist")).into());
            }
            id
        }
        None => {
            let created = payment_method::create_payment_method(conn, &name, form.applies_to, form.sort_order)
                .map_err(|e| map_duplicate(e, &name))?;
            if !form.active {
                payment_method::update_payment_method(conn, created.id, &name, form.applies_to, false, form.sort_order)?;
            }
            created.id
        }
    };

    log_event(
        conn,
        if form.id.is_some() { "payment_method_updated" } else { "payment_method_created" },
        "payment_method",
        &id.to_string(),
        serde_json::json!({
            "name": name,
            "applies_to": form.applies_to.as_str(),
            "active": form.active,
            "sort_order": form.sort_order,
        }),
        &user.email,
    );

    payment_method::get_payment_method(conn, id)?
        .ok_or_else(|| CajaError::not_found(format!("Payment method {id} does not exist")).into())
}

// ============================================================================
// MOVEMENTS
// ============================================================================

pub fn latest_movements(conn: &Connection, user: &User) -> Result<Vec<Movement>> {
    require_admin(user)?;
    movement::latest_movements(conn, LATEST_MOVEMENTS_LIMIT)
}

pub fn correct_movement(conn: &Connection, user: &User, id: i64, update: &MovementUpdate) -> Result<Movement> {
    require_admin(user)?;
    if let Some(amount) = update.amount {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CajaError::validation("Amount must be greater than 0").into());
        }
    }

    if !movement::update_movement(conn, id, update)? {
        return Err(CajaError::not_found(format!("Movement {id} does not exist")).into());
    }

    log_event(
        conn,
        "movement_updated",
        "movement",
        &id.to_string(),
        serde_json::to_value(update)?,
        &user.email,
    );
    tracing::info!(movement_id = id, actor = %user.email, "movement corrected");

    movement::get_movement(conn, id)?
        .ok_or_else(|| CajaError::not_found(format!("Movement {id} does not exist")).into())
}

pub fn remove_movement(conn: &Connection, user: &User, id: i64) -> Result<()> {
    require_admin(user)?;
    let existing = movement::get_movement(conn, id)?
        .ok_or_else(|| CajaError::not_found(format!("Movement {id} does not exist")))?;

    movement::delete_movement(conn, id)?;

    log_event(
        conn,
        "movement_deleted",
        "movement",
        &id.to_string(),
        serde_json::to_value(&existing)?,
        &user.email,
    );
    tracing::info!(movement_id = id, actor = %user.email, "movement deleted");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::{get_events_for_entity, open_in_memory};
    use crate::entities::{MovementKind, NewMovement};
    use crate::error::domain_error;
    use chrono::NaiveDate;

    fn admin() -> User {
        User {
            id: "a".to_string(),
            email: "admin@cajas.local".to_string(),
            full_name: "Admin".to_string(),
            role: Role::Admin,
            branch_id: None,
        }
    }

    fn branch_form(name: &str) -> BranchForm {
        BranchForm {
            id: None,
            name: name.to_string(),
            active: true,
            crm_system: None,
        }
    }

    #[test]
    fn test_save_branch_create_and_update() {
        let conn = open_in_memory().unwrap();
        let created = save_branch(&conn, &admin(), &branch_form(" Centro ")).unwrap();
        assert_eq!(created.name, "Centro");
        assert!(created.active);

        let updated = save_branch(
            &conn,
            &admin(),
            &BranchForm {
                id: Some(created.id),
                name: "Centro".to_string(),
                active: false,
                crm_system: Some(Some("Fudo".to_string())),
            },
        )
        .unwrap();
        assert!(!updated.active);
        assert_eq!(updated.crm_system.as_deref(), Some("Fudo"));
        assert_eq!(get_events_for_entity(&conn, "branch", &created.id.to_string()).unwrap().len(), 2);
    }

    #[test]
    fn test_rename_without_crm_field_keeps_crm_system() {
        let conn = open_in_memory().unwrap();
        let created = save_branch(
            &conn,
            &admin(),
            &BranchForm {
                crm_system: Some(Some("Fudo".to_string())),
                ..branch_form("Centro")
            },
        )
        .unwrap();
        assert_eq!(created.crm_system.as_deref(), Some("Fudo"));

        let renamed = save_branch(
            &conn,
            &admin(),
            &BranchForm {
                id: Some(created.id),
                active: false,
                ..branch_form("Centro Norte")
            },
        )
        .unwrap();
        assert_eq!(renamed.name, "Centro Norte");
        assert!(!renamed.active);
        assert_eq!(renamed.crm_system.as_deref(), Some("Fudo"));

        // An explicit null clears it
        let form: BranchForm =
            serde_json::from_str(&format!(r#"{{"id": {}, "name": "Centro Norte", "crm_system": null}}"#, created.id))
                .unwrap();
        assert_eq!(form.crm_system, Some(None));
        let cleared = save_branch(&conn, &admin(), &form).unwrap();
        assert_eq!(cleared.crm_system, None);
    }

    #[test]
    fn test_branch_form_json_tells_absent_from_null() {
        let absent: BranchForm = serde_json::from_str(r#"{"name": "Centro"}"#).unwrap();
        assert_eq!(absent.crm_system, None);
        assert!(absent.active);

        let set: BranchForm = serde_json::from_str(r#"{"name": "Centro", "crm_system": "Fudo"}"#).unwrap();
        assert_eq!(set.crm_system, Some(Some("Fudo".to_string())));
    }

    #[test]
    fn test_check_violation_is_not_reported_as_duplicate() {
        let conn = open_in_memory().unwrap();
        let err: anyhow::Error = conn
            .execute(
                "INSERT INTO categories (name, kind, active) VALUES ('Rara', 'other', 1)",
                [],
            )
            .unwrap_err()
            .into();
        let mapped = map_duplicate(err, "Rara");
        assert!(domain_error(&mapped).is_none());
        assert!(!mapped.to_string().contains("already exists"));
    }

    #[test]
    fn test_duplicate_and_empty_names_are_validation_errors() {
        let conn = open_in_memory().unwrap();
        save_branch(&conn, &admin(), &branch_form("Centro")).unwrap();

        let err = save_branch(&conn, &admin(), &branch_form("Centro")).unwrap_err();
        assert!(matches!(domain_error(&err), Some(CajaError::Validation(_))));

        let err = save_branch(&conn, &admin(), &branch_form("  ")).unwrap_err();
        assert_eq!(err.to_string(), "Name is required");
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let conn = open_in_memory().unwrap();
        let err = save_branch(
            &conn,
            &admin(),
            &BranchForm {
                id: Some(99),
                ..branch_form("X")
            },
        )
        .unwrap_err();
        assert!(matches!(domain_error(&err), Some(CajaError::NotFound(_))));
        assert!(remove_movement(&conn, &admin(), 99).is_err());
    }

    #[test]
    fn test_non_admin_rejected() {
        let conn = open_in_memory().unwrap();
        let supervisor = User {
            role: Role::Supervisor,
            ..admin()
        };
        assert!(save_branch(&conn, &supervisor, &branch_form("Centro")).is_err());
        assert!(list_branches(&conn, &supervisor).is_err());
        assert!(latest_movements(&conn, &supervisor).is_err());
    }

    #[test]
    fn test_save_category_and_payment_method() {
        let conn = open_in_memory().unwrap();
        let category = save_category(
            &conn,
            &admin(),
            &CategoryForm {
                id: None,
                name: "Delivery".to_string(),
                kind: CategoryKind::Sale,
                active: false,
            },
        )
        .unwrap();
        assert!(!category.active);

        let method = save_payment_method(
            &conn,
            &admin(),
            &PaymentMethodForm {
                id: None,
                name: "Tarjeta".to_string(),
                applies_to: AppliesTo::Sale,
                active: true,
                sort_order: 2,
            },
        )
        .unwrap();
        assert_eq!(method.sort_order, 2);
        assert_eq!(method.applies_to, AppliesTo::Sale);
    }

    #[test]
    fn test_correct_and_remove_movement() {
        let conn = open_in_memory().unwrap();
        let centro = branch::create_branch(&conn, "Centro").unwrap();
        let sale = category::create_category(&conn, "Mostrador", CategoryKind::Sale).unwrap();
        let cash = payment_method::find_cash_method(&conn).unwrap().unwrap();
        let id = movement::insert_movement(
            &conn,
            &NewMovement {
                branch_id: centro.id,
                date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                kind: MovementKind::Sale,
                category_id: sale.id,
                payment_method_id: cash.id,
                amount: 100.0,
                concept: "venta".to_string(),
                employee_name: None,
                recorded_by: "Admin".to_string(),
            },
        )
        .unwrap();

        let bad = MovementUpdate {
            amount: Some(0.0),
            ..Default::default()
        };
        assert!(correct_movement(&conn, &admin(), id, &bad).is_err());

        let fixed = correct_movement(
            &conn,
            &admin(),
            id,
            &MovementUpdate {
                amount: Some(150.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(fixed.amount, 150.0);
        assert_eq!(fixed.concept, "venta");
        assert_eq!(latest_movements(&conn, &admin()).unwrap().len(), 1);

        remove_movement(&conn, &admin(), id).unwrap();
        assert!(movement::get_movement(&conn, id).unwrap().is_none());
        assert_eq!(get_events_for_entity(&conn, "movement", &id.to_string()).unwrap().len(), 2);
    }
}
