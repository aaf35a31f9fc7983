//! # Validation Module
//!
//! Input validation for sale requests.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CreateSaleRequest                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  THIS MODULE: shape checks (no I/O)                                    │
//! │  ├── ids are UUIDs, cart size, quantities                              │
//! │  └── customer email / phone                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Orchestrator: existence & ownership lookups                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite: CHECK (quantity >= 0), UNIQUE, FOREIGN KEY                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use kassa_core::validation::{validate_cart_size, validate_quantity};
//!
//! validate_quantity(5).unwrap();
//! validate_cart_size(3, 100).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{AMOUNT_SCALE, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of one cart line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price.
///
/// ## Rules
/// - Must be non-negative (zero is a free item)
/// - At most four decimal places
///
/// ## Example
/// ```rust
/// use kassa_core::money::Money;
/// use kassa_core::validation::validate_unit_price;
///
/// assert!(validate_unit_price(Money::new(1099, 2)).is_ok());
/// assert!(validate_unit_price(Money::new(-1, 0)).is_err());
/// ```
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price".to_string(),
        });
    }

    if price.scale() > AMOUNT_SCALE {
        return Err(ValidationError::InvalidFormat {
            field: "unit_price".to_string(),
            reason: format!("at most {} decimal places allowed", AMOUNT_SCALE),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines of a cart.
///
/// ## Rules
/// - At least one line
/// - At most `max_lines`
pub fn validate_cart_size(lines: usize, max_lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "cart".to_string(),
        });
    }

    if lines > max_lines {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: max_lines as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Contact Validators
// =============================================================================

/// Validates an optional customer email.
///
/// Only the shape is checked: one `@`, a non-empty local part and a dotted
/// domain. Delivery is someone else's problem.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "customer_email".to_string(),
        reason: reason.to_string(),
    };

    if email.len() > 254 {
        return Err(ValidationError::TooLong {
            field: "customer_email".to_string(),
            max: 254,
        });
    }

    let (local, domain) = email.split_once('@').ok_or_else(|| invalid("missing @"))?;

    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid("not an email address"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid("domain must contain a dot"));
    }

    Ok(())
}

/// Validates an optional customer phone number.
///
/// ## Rules
/// - Optional leading `+`
/// - Spaces, dashes and dots are ignored
/// - 8 to 15 digits (E.164 upper bound)
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    let body = phone.strip_prefix('+').unwrap_or(phone);

    let mut digits = 0usize;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '.' => {}
            _ => {
                return Err(ValidationError::InvalidFormat {
                    field: "customer_phone".to_string(),
                    reason: format!("unexpected character '{}'", c),
                })
            }
        }
    }

    if !(8..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: "customer_phone".to_string(),
            reason: "must contain 8 to 15 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string for the named field.
///
/// ## Example
/// ```rust
/// use kassa_core::validation::validate_id;
///
/// assert!(validate_id("business_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_id("business_id", "not-a-uuid").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_unit_price() {
        assert!(validate_unit_price(Money::zero()).is_ok());
        assert!(validate_unit_price("1180.5000".parse().unwrap()).is_ok());
        assert!(validate_unit_price("0.00001".parse().unwrap()).is_err());
        assert!(validate_unit_price("-3".parse().unwrap()).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(matches!(
            validate_cart_size(0, 10),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_cart_size(10, 10).is_ok());
        assert!(validate_cart_size(11, 10).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("awa@shop.sn").is_ok());
        assert!(validate_email(" awa.diop@mail.example.com ").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("awa").is_err());
        assert!(validate_email("@shop.sn").is_err());
        assert!(validate_email("awa@shop").is_err());
        assert!(validate_email("awa@@shop.sn").is_err());
        assert!(validate_email("a wa@shop.sn").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+221 77 123 45 67").is_ok());
        assert!(validate_phone("771234567").is_ok());

        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("+221-77-ABC").is_err());
        assert!(validate_phone("1234567890123456").is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(matches!(
            validate_id("cashier_id", " "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_id("id", "123").is_err());
    }
}
