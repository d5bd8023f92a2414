// 🛡️ Access Rules - who may see which branch, and which dates
//
// Admin / supervisor: every active branch, any date.
// Branch manager:     their assigned branch only, today or yesterday only.
//
// These are pure functions: callers pass in the branch list and "today"
// (computed in the business timezone, see Config::today).

use crate::auth::{Role, User};
use crate::entities::Branch;
use crate::error::CajaError;
use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Date format shown to users
pub const DISPLAY_DATE: &str = "%d/%m/%Y";

/// Dates a form may offer for a role
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DateChoices {
    /// Free date picker, defaulting to today
    Any { default: NaiveDate },
    /// Pick one of these (today first)
    Only { dates: Vec<NaiveDate> },
}

pub fn yesterday_of(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

/// Branches the user may work with, out of all active ones
pub fn allowed_branches(user: &User, all_branches: &[Branch]) -> Result<Vec<Branch>, CajaError> {
    if user.role.has_full_access() {
        return Ok(all_branches.to_vec());
    }

    let assigned = user.branch_id.ok_or_else(|| {
        CajaError::forbidden("You have no branch assigned. Contact the administrator.")
    })?;

    let filtered: Vec<Branch> = all_branches
        .iter()
        .filter(|b| b.id == assigned)
        .cloned()
        .collect();

    if filtered.is_empty() {
        return Err(CajaError::forbidden(format!(
            "Your assigned branch (ID: {assigned}) does not exist."
        )));
    }

    Ok(filtered)
}

pub fn can_access_branch(user: &User, branch_id: i64) -> bool {
    if user.role.has_full_access() {
        return true;
    }
    user.branch_id == Some(branch_id)
}

pub fn require_branch(user: &User, branch_id: i64) -> Result<(), CajaError> {
    if can_access_branch(user, branch_id) {
        Ok(())
    } else {
        Err(CajaError::forbidden(format!("You cannot access branch {branch_id}")))
    }
}

/// Whether `role` may record or view movements dated `date`
pub fn check_date(role: Role, date: NaiveDate, today: NaiveDate) -> Result<(), CajaError> {
    if role.has_full_access() {
        return Ok(());
    }

    let yesterday = yesterday_of(today);
    if date == today || date == yesterday {
        return Ok(());
    }

    Err(CajaError::forbidden(format!(
        "You can only record movements for TODAY ({}) or YESTERDAY ({})",
        today.format(DISPLAY_DATE),
        yesterday.format(DISPLAY_DATE)
    )))
}

pub fn date_choices(role: Role, today: NaiveDate) -> DateChoices {
    if role.has_full_access() {
        DateChoices::Any { default: today }
    } else {
        DateChoices::Only {
            dates: vec![today, yesterday_of(today)],
        }
    }
}

/// Gate for reports, CRM, reconciliation and maintenance
pub fn require_admin(user: &User) -> Result<(), CajaError> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(CajaError::forbidden("Only administrators can do this"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, branch_id: Option<i64>) -> User {
        User {
            id: "u1".to_string(),
            email: "u1@cajas.local".to_string(),
            full_name: "U1".to_string(),
            role,
            branch_id,
        }
    }

    fn branches() -> Vec<Branch> {
        (1..=3)
            .map(|id| Branch {
                id,
                name: format!("Suc{id:02}"),
                active: true,
                crm_system: None,
            })
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_full_access_roles_see_every_branch() {
        assert_eq!(allowed_branches(&user(Role::Admin, None), &branches()).unwrap().len(), 3);
        assert_eq!(allowed_branches(&user(Role::Supervisor, Some(2)), &branches()).unwrap().len(), 3);
    }

    #[test]
    fn test_branch_manager_sees_only_assigned_branch() {
        let allowed = allowed_branches(&user(Role::BranchManager, Some(2)), &branches()).unwrap();
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].id, 2);

        let manager = user(Role::BranchManager, Some(2));
        assert!(can_access_branch(&manager, 2));
        assert!(!can_access_branch(&manager, 3));
        assert!(require_branch(&manager, 3).is_err());
    }

    #[test]
    fn test_branch_manager_without_branch() {
        let err = allowed_branches(&user(Role::BranchManager, None), &branches()).unwrap_err();
        assert!(err.to_string().contains("no branch assigned"));
        assert!(!can_access_branch(&user(Role::BranchManager, None), 1));
    }

    #[test]
    fn test_branch_manager_with_missing_branch() {
        let err = allowed_branches(&user(Role::BranchManager, Some(9)), &branches()).unwrap_err();
        assert!(err.to_string().contains("(ID: 9) does not exist"));
    }

    #[test]
    fn test_branch_manager_dates_today_and_yesterday_only() {
        let today = date(2025, 3, 1);

        assert!(check_date(Role::BranchManager, today, today).is_ok());
        assert!(check_date(Role::BranchManager, date(2025, 2, 28), today).is_ok());

        let err = check_date(Role::BranchManager, date(2025, 2, 27), today).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You can only record movements for TODAY (01/03/2025) or YESTERDAY (28/02/2025)"
        );
        assert!(check_date(Role::BranchManager, date(2025, 3, 2), today).is_err());
    }

    #[test]
    fn test_full_access_roles_any_date() {
        let today = date(2025, 3, 1);
        assert!(check_date(Role::Admin, date(2024, 1, 1), today).is_ok());
        assert!(check_date(Role::Supervisor, date(2026, 1, 1), today).is_ok());
    }

    #[test]
    fn test_date_choices() {
        let today = date(2025, 1, 1);
        assert_eq!(
            date_choices(Role::BranchManager, today),
            DateChoices::Only {
                dates: vec![today, date(2024, 12, 31)]
            }
        );
        assert_eq!(date_choices(Role::Admin, today), DateChoices::Any { default: today });
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&user(Role::Admin, None)).is_ok());
        assert!(require_admin(&user(Role::Supervisor, None)).is_err());
        assert!(require_admin(&user(Role::BranchManager, Some(1))).is_err());
    }
}
