// Entity Models - one file per table
//
// Each entity owns:
// - its row struct (what the API and reports see)
// - the SQL that reads and writes it
// Access rules live elsewhere (access.rs); these functions trust their caller.

pub mod branch;
pub mod category;
pub mod payment_method;
pub mod movement;
pub mod crm;

pub use branch::Branch;
pub use category::{Category, CategoryKind};
pub use payment_method::{AppliesTo, PaymentMethod};
pub use movement::{Movement, MovementKind, MovementUpdate, NewMovement};
pub use crm::{CrmDaily, UpsertOutcome};

/// Payment method every expense and payroll entry is paid with
pub const CASH_METHOD: &str = "Efectivo";

/// Expense category reserved for payroll entries
pub const PAYROLL_CATEGORY: &str = "Sueldos";

/// Shared helper: map a text column onto one of our enums
pub(crate) fn parse_text_column<T>(
    idx: usize,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unexpected value '{value}'").into(),
        )
    })
}
