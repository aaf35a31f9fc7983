//! # Error Types
//!
//! Domain-specific error types for kassa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kassa-core errors (this file)                                         │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kassa-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── StockError       - Inventory ledger refusals                      │
//! │                                                                         │
//! │  kassa-sales errors                                                    │
//! │  └── SaleError        - What the sale caller sees                      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SaleError ← DbError / StockError  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::sale_flow::SaleStage;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sale attempt tried to move between two stages that are not linked.
    ///
    /// ## When This Occurs
    /// - A programming error in the orchestrator (e.g. persisting before
    ///   reserving stock)
    /// - Advancing an attempt that already reached a terminal stage
    #[error("Illegal sale stage transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SaleStage, to: SaleStage },

    /// Arithmetic on money left the representable range.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// They are raised before any mutation takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A referenced entity does not exist (or is soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A referenced entity exists but belongs to another business.
    #[error("{entity} {id} does not belong to business {business_id}")]
    ForeignOwnership {
        entity: String,
        id: String,
        business_id: String,
    },
}

impl ValidationError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ValidationError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
