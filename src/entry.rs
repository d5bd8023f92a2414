// 📝 Movement Entry - turn a submitted form into a stored movement
//
// Resolution rules per kind:
//   Sale     → category and payment method picked by the user (sale lists)
//   Expense  → category picked by the user (never "Sueldos"), cash forced
//   Payroll  → "Sueldos" + cash forced, employee name required
//
// Validation order (first failure wins):
//   branch access → date allowed → amount > 0 → category/method resolved
//   → employee name (payroll)

use crate::access::{check_date, require_branch};
use crate::auth::User;
use crate::db::log_event;
use crate::entities::{
    branch, category, movement, payment_method, Category, CategoryKind, Movement, MovementKind,
    NewMovement, PaymentMethod, PAYROLL_CATEGORY,
};
use crate::error::CajaError;
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

// ============================================================================
// FORM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryForm {
    pub kind: MovementKind,
    pub branch_id: i64,
    pub date: NaiveDate,
    pub amount: f64,

    /// Ignored for payroll (forced to "Sueldos")
    #[serde(default)]
    pub category_id: Option<i64>,

    /// Ignored for expense and payroll (forced to cash)
    #[serde(default)]
    pub payment_method_id: Option<i64>,

    /// Free-text detail (optional)
    #[serde(default)]
    pub concept: String,

    /// Required for payroll
    #[serde(default)]
    pub employee_name: Option<String>,
}

/// What the entry form should offer for a kind
#[derive(Debug, Clone, Serialize)]
pub struct FormOptions {
    pub kind: MovementKind,
    pub categories: Vec<Category>,
    pub payment_methods: Vec<PaymentMethod>,

    /// Set when the kind forces a category (payroll)
    pub fixed_category: Option<Category>,

    /// Set when the kind forces a method (expense, payroll)
    pub fixed_payment_method: Option<PaymentMethod>,

    /// Missing configuration the form should warn about
    pub problems: Vec<String>,
}

pub const MISSING_PAYROLL_CATEGORY: &str =
    "The 'Sueldos' category does not exist. Create it in Maintenance.";
pub const MISSING_CASH_METHOD: &str = "Missing the 'Efectivo' payment method.";
pub const MISSING_CONFIGURATION: &str = "Missing configuration (category or payment method).";

pub fn form_options(conn: &Connection, kind: MovementKind) -> Result<FormOptions> {
    let mut problems = Vec::new();
    let mut categories = Vec::new();
    let mut payment_methods = Vec::new();
    let mut fixed_category = None;
    let mut fixed_payment_method = None;

    match kind {
        MovementKind::Sale => {
            categories = category::categories_for_form(conn, CategoryKind::Sale)?;
            if categories.is_empty() {
                problems.push("No sale categories available.".to_string());
            }
            payment_methods = payment_method::payment_methods_for(conn, CategoryKind::Sale)?;
            if payment_methods.is_empty() {
                problems.push("No sale payment methods available.".to_string());
            }
        }
        MovementKind::Expense => {
            categories = category::categories_for_form(conn, CategoryKind::Expense)?;
            if categories.is_empty() {
                problems.push("No expense categories available.".to_string());
            }
        }
        MovementKind::Payroll => {
            fixed_category = category::find_active_by_name(conn, CategoryKind::Expense, PAYROLL_CATEGORY)?;
            if fixed_category.is_none() {
                problems.push(MISSING_PAYROLL_CATEGORY.to_string());
            }
        }
    }

    if kind.is_outflow() {
        fixed_payment_method = payment_method::find_cash_method(conn)?;
        if fixed_payment_method.is_none() {
            problems.push(MISSING_CASH_METHOD.to_string());
        }
    }

    Ok(FormOptions {
        kind,
        categories,
        payment_methods,
        fixed_category,
        fixed_payment_method,
        problems,
    })
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Category and method the form resolves to (None = not usable)
fn resolve(conn: &Connection, form: &EntryForm) -> Result<(Option<Category>, Option<PaymentMethod>)> {
    match form.kind {
        MovementKind::Payroll => {
            let category = category::find_active_by_name(conn, CategoryKind::Expense, PAYROLL_CATEGORY)?;
            let method = payment_method::find_cash_method(conn)?;
            Ok((category, method))
        }
        MovementKind::Expense => {
            let category = match form.category_id {
                Some(id) => category::get_category(conn, id)?
                    .filter(|c| c.active && c.kind == CategoryKind::Expense && !c.is_payroll()),
                None => None,
            };
            let method = payment_method::find_cash_method(conn)?;
            Ok((category, method))
        }
        MovementKind::Sale => {
            let category = match form.category_id {
                Some(id) => category::get_category(conn, id)?
                    .filter(|c| c.active && c.kind == CategoryKind::Sale),
                None => None,
            };
            let method = match form.payment_method_id {
                Some(id) => payment_method::get_payment_method(conn, id)?
                    .filter(|m| m.active && m.applies_to.covers(CategoryKind::Sale)),
                None => None,
            };
            Ok((category, method))
        }
    }
}

/// Validate the form for `user` and build the row to insert
pub fn validate_entry(conn: &Connection, user: &User, form: &EntryForm, today: NaiveDate) -> Result<NewMovement> {
    let target = branch::get_branch(conn, form.branch_id)?
        .filter(|b| b.active)
        .ok_or_else(|| CajaError::not_found(format!("Branch {} does not exist", form.branch_id)))?;
    require_branch(user, target.id)?;

    check_date(user.role, form.date, today)?;

    if !form.amount.is_finite() || form.amount <= 0.0 {
        return Err(CajaError::validation("The amount must be greater than 0.").into());
    }

    let (category, method) = resolve(conn, form)?;
    let (Some(category), Some(method)) = (category, method) else {
        return Err(CajaError::validation(MISSING_CONFIGURATION).into());
    };

    let employee_name = form
        .employee_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if form.kind == MovementKind::Payroll && employee_name.is_none() {
        return Err(CajaError::validation("You must enter the employee's name.").into());
    }

    Ok(NewMovement {
        branch_id: target.id,
        date: form.date,
        kind: form.kind,
        category_id: category.id,
        payment_method_id: method.id,
        amount: form.amount,
        concept: form.concept.trim().to_string(),
        employee_name: if form.kind == MovementKind::Payroll { employee_name } else { None },
        recorded_by: user.full_name.clone(),
    })
}

/// Validate and store; returns the stored row
pub fn record_movement(conn: &Connection, user: &User, form: &EntryForm, today: NaiveDate) -> Result<Movement> {
    let new_movement = validate_entry(conn, user, form, today)?;
    let id = movement::insert_movement(conn, &new_movement)?;

    log_event(
        conn,
        "movement_recorded",
        "movement",
        &id.to_string(),
        serde_json::json!({
            "branch_id": new_movement.branch_id,
            "date": new_movement.date,
            "kind": new_movement.kind.as_str(),
            "amount": new_movement.amount,
        }),
        &user.email,
    );
    tracing::info!(
        id,
        branch_id = new_movement.branch_id,
        kind = new_movement.kind.as_str(),
        amount = new_movement.amount,
        "movement recorded"
    );

    movement::get_movement(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("movement {id} vanished right after insert"))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::open_in_memory;
    use crate::entities::{AppliesTo, CASH_METHOD};
    use crate::error::domain_error;

    struct Fixture {
        conn: Connection,
        branch_id: i64,
        other_branch_id: i64,
        sale_category: i64,
        expense_category: i64,
        card: i64,
        today: NaiveDate,
    }

    fn fixture() -> Fixture {
        let conn = open_in_memory().unwrap();
        let branch_id = branch::create_branch(&conn, "Suc01").unwrap().id;
        let other_branch_id = branch::create_branch(&conn, "Suc02").unwrap().id;
        let sale_category = category::create_category(&conn, "Mostrador", CategoryKind::Sale).unwrap().id;
        let expense_category = category::create_category(&conn, "Limpieza", CategoryKind::Expense).unwrap().id;
        let card = payment_method::create_payment_method(&conn, "Tarjeta", AppliesTo::Sale, 1).unwrap().id;
        Fixture {
            conn,
            branch_id,
            other_branch_id,
            sale_category,
            expense_category,
            card,
            today: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        }
    }

    fn manager(branch_id: i64) -> User {
        User {
            id: "m1".to_string(),
            email: "suc01@cajas.local".to_string(),
            full_name: "Encargado Suc01".to_string(),
            role: Role::BranchManager,
            branch_id: Some(branch_id),
        }
    }

    fn sale_form(f: &Fixture) -> EntryForm {
        EntryForm {
            kind: MovementKind::Sale,
            branch_id: f.branch_id,
            date: f.today,
            amount: 2500.0,
            category_id: Some(f.sale_category),
            payment_method_id: Some(f.card),
            concept: "  mesa 4 ".to_string(),
            employee_name: None,
        }
    }

    fn validation_message(err: &anyhow::Error) -> String {
        domain_error(err).map(|e| e.to_string()).unwrap_or_default()
    }

    #[test]
    fn test_record_sale() {
        let f = fixture();
        let stored = record_movement(&f.conn, &manager(f.branch_id), &sale_form(&f), f.today).unwrap();

        assert_eq!(stored.kind, MovementKind::Sale);
        assert_eq!(stored.payment_method_name, "Tarjeta");
        assert_eq!(stored.concept, "mesa 4");
        assert_eq!(stored.recorded_by, "Encargado Suc01");
    }

    #[test]
    fn test_expense_forces_cash() {
        let f = fixture();
        let form = EntryForm {
            kind: MovementKind::Expense,
            category_id: Some(f.expense_category),
            payment_method_id: Some(f.card),
            ..sale_form(&f)
        };
        let stored = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap();
        assert_eq!(stored.payment_method_name, CASH_METHOD);
        assert_eq!(stored.category_name, "Limpieza");
    }

    #[test]
    fn test_payroll_forces_category_and_requires_employee() {
        let f = fixture();
        let form = EntryForm {
            kind: MovementKind::Payroll,
            category_id: Some(f.expense_category),
            employee_name: Some("   ".to_string()),
            ..sale_form(&f)
        };
        let err = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), "You must enter the employee's name.");

        let form = EntryForm {
            employee_name: Some("María Gómez".to_string()),
            ..form
        };
        let stored = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap();
        assert_eq!(stored.category_name, PAYROLL_CATEGORY);
        assert_eq!(stored.payment_method_name, CASH_METHOD);
        assert_eq!(stored.employee_name.as_deref(), Some("María Gómez"));
    }

    #[test]
    fn test_expense_cannot_use_payroll_category() {
        let f = fixture();
        let payroll = category::find_active_by_name(&f.conn, CategoryKind::Expense, PAYROLL_CATEGORY)
            .unwrap()
            .unwrap();
        let form = EntryForm {
            kind: MovementKind::Expense,
            category_id: Some(payroll.id),
            ..sale_form(&f)
        };
        let err = validate_entry(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);
    }

    fn deactivate_cash(conn: &Connection) -> i64 {
        let cash = payment_method::find_cash_method(conn).unwrap().unwrap();
        payment_method::update_payment_method(conn, cash.id, CASH_METHOD, AppliesTo::Both, false, 0).unwrap();
        cash.id
    }

    fn stored_count(conn: &Connection) -> usize {
        movement::latest_movements(conn, 100).unwrap().len()
    }

    #[test]
    fn test_expense_without_active_cash_is_missing_configuration() {
        let f = fixture();
        deactivate_cash(&f.conn);
        let form = EntryForm {
            kind: MovementKind::Expense,
            category_id: Some(f.expense_category),
            ..sale_form(&f)
        };
        let err = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);
        assert_eq!(stored_count(&f.conn), 0);
    }

    #[test]
    fn test_sale_with_inactive_cash_is_missing_configuration() {
        let f = fixture();
        let cash_id = deactivate_cash(&f.conn);
        let form = EntryForm {
            payment_method_id: Some(cash_id),
            ..sale_form(&f)
        };
        let err = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);

        // Other sale methods keep working
        assert!(record_movement(&f.conn, &manager(f.branch_id), &sale_form(&f), f.today).is_ok());
        assert_eq!(stored_count(&f.conn), 1);
    }

    #[test]
    fn test_payroll_without_sueldos_is_missing_configuration() {
        let f = fixture();
        f.conn
            .execute("DELETE FROM categories WHERE name = ?1", [PAYROLL_CATEGORY])
            .unwrap();
        let form = EntryForm {
            kind: MovementKind::Payroll,
            employee_name: Some("María Gómez".to_string()),
            ..sale_form(&f)
        };
        let err = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);

        // Resolution is checked before the employee name
        let form = EntryForm {
            employee_name: None,
            ..form
        };
        let err = record_movement(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);
        assert_eq!(stored_count(&f.conn), 0);
    }

    #[test]
    fn test_sale_rejects_expense_only_method() {
        let f = fixture();
        let cheque = payment_method::create_payment_method(&f.conn, "Cheque", AppliesTo::Expense, 5).unwrap();
        let form = EntryForm {
            payment_method_id: Some(cheque.id),
            ..sale_form(&f)
        };
        let err = validate_entry(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), MISSING_CONFIGURATION);
    }

    #[test]
    fn test_validation_order_date_before_amount() {
        let f = fixture();
        let form = EntryForm {
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            amount: 0.0,
            ..sale_form(&f)
        };
        let err = validate_entry(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert!(validation_message(&err).starts_with("You can only record movements for TODAY"));

        let form = EntryForm { date: f.today, ..form };
        let err = validate_entry(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert_eq!(validation_message(&err), "The amount must be greater than 0.");
    }

    #[test]
    fn test_manager_cannot_record_for_other_branch() {
        let f = fixture();
        let form = EntryForm {
            branch_id: f.other_branch_id,
            ..sale_form(&f)
        };
        let err = validate_entry(&f.conn, &manager(f.branch_id), &form, f.today).unwrap_err();
        assert!(matches!(domain_error(&err), Some(CajaError::Forbidden(_))));
    }

    #[test]
    fn test_supervisor_records_any_branch_any_date() {
        let f = fixture();
        let supervisor = User {
            role: Role::Supervisor,
            branch_id: None,
            ..manager(f.branch_id)
        };
        let form = EntryForm {
            branch_id: f.other_branch_id,
            date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            ..sale_form(&f)
        };
        assert!(validate_entry(&f.conn, &supervisor, &form, f.today).is_ok());
    }

    #[test]
    fn test_form_options_report_missing_configuration() {
        let f = fixture();
        let payroll = category::find_active_by_name(&f.conn, CategoryKind::Expense, PAYROLL_CATEGORY)
            .unwrap()
            .unwrap();
        category::update_category(&f.conn, payroll.id, PAYROLL_CATEGORY, CategoryKind::Expense, false).unwrap();

        let options = form_options(&f.conn, MovementKind::Payroll).unwrap();
        assert!(options.fixed_category.is_none());
        assert_eq!(options.problems, vec![MISSING_PAYROLL_CATEGORY.to_string()]);

        let expense = form_options(&f.conn, MovementKind::Expense).unwrap();
        assert_eq!(expense.fixed_payment_method.unwrap().name, CASH_METHOD);
        assert!(expense.categories.iter().all(|c| c.name != PAYROLL_CATEGORY));
    }
}
