//! # Sale Error Types
//!
//! What callers of the sale engine get back when a sale does not go through.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Client errors  │  │  Server errors  │  │   Never surfaced        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Persistence    │  │  ReceiptError           │ │
//! │  │  InsufficientSt.│  │  Core           │  │  (logged by the worker) │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  ConfigError    │  startup only                                      │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kassa_core::{CoreError, ValidationError};
use kassa_db::{DbError, StockError};

/// Result type alias for sale operations.
pub type SaleResult<T> = Result<T, SaleError>;

// =============================================================================
// Sale Error
// =============================================================================

/// Reasons a sale attempt did not produce a committed sale.
///
/// `Validation` and `InsufficientStock` leave the database exactly as it was.
/// `Persistence` means the transaction was rolled back.
#[derive(Debug, Error)]
pub enum SaleError {
    /// The request was refused before anything was written.
    #[error("Invalid sale request: {0}")]
    Validation(ValidationError),

    /// A cart line asks for more units than are on hand.
    ///
    /// `available` is the on-hand quantity before the sale. `requested` is
    /// the cart's total for the product up to the refused line, so two lines
    /// of 3 against 5 units report 5 available and 6 requested.
    #[error("Insufficient stock for {product_name} ({product_id}): available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        product_name: String,
        available: i64,
        requested: i64,
    },

    /// The sale could not be written.
    #[error("Sale could not be persisted: {0}")]
    Persistence(#[from] DbError),

    /// Domain rule broken inside the engine (stage order, overflow).
    #[error("Sale engine error: {0}")]
    Core(CoreError),
}

impl From<ValidationError> for SaleError {
    fn from(err: ValidationError) -> Self {
        SaleError::Validation(err)
    }
}

impl From<CoreError> for SaleError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(inner) => SaleError::Validation(inner),
            other => SaleError::Core(other),
        }
    }
}

impl From<StockError> for SaleError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::Insufficient {
                product_id,
                available,
                requested,
            } => SaleError::InsufficientStock {
                product_name: product_id.clone(),
                product_id,
                available,
                requested,
            },
            StockError::MissingStock { product_id } => {
                SaleError::Validation(ValidationError::not_found("Stock", product_id))
            }
            StockError::InvalidQuantity { quantity } => {
                SaleError::Validation(ValidationError::MustBePositive {
                    field: format!("quantity ({})", quantity),
                })
            }
            StockError::Db(db) => SaleError::Persistence(db),
            other => SaleError::Persistence(DbError::Internal(other.to_string())),
        }
    }
}

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    InsufficientStock,
    PersistenceFailed,
    Internal,
}

impl SaleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SaleError::Validation(ValidationError::NotFound { .. }) => ErrorCode::NotFound,
            SaleError::Validation(_) => ErrorCode::ValidationFailed,
            SaleError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            SaleError::Persistence(_) => ErrorCode::PersistenceFailed,
            SaleError::Core(_) => ErrorCode::Internal,
        }
    }

    /// True when the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SaleError::Validation(_) | SaleError::InsufficientStock { .. }
        )
    }

    /// Message that is safe to show to a cashier.
    ///
    /// Server-side failures get a generic text; the detail only goes to logs.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "The sale could not be recorded. Please try again.".to_string()
        }
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// Failures while loading or saving `kassa.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        let err = SaleError::from(ValidationError::not_found("Product", "p-1"));
        assert!(err.is_client_error());
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(
            err.public_message(),
            "Invalid sale request: Product not found: p-1"
        );

        let err = SaleError::InsufficientStock {
            product_id: "p-1".into(),
            product_name: "Savon".into(),
            available: 5,
            requested: 6,
        };
        assert!(err.is_client_error());
        assert_eq!(err.code(), ErrorCode::InsufficientStock);
        assert!(err.public_message().contains("available 5, requested 6"));
    }

    #[test]
    fn test_persistence_detail_stays_private() {
        let err = SaleError::from(DbError::Internal("disk I/O error".into()));
        assert!(!err.is_client_error());
        assert_eq!(err.code(), ErrorCode::PersistenceFailed);
        assert!(!err.public_message().contains("disk"));
        assert!(err.to_string().contains("disk I/O error"));
    }

    #[test]
    fn test_core_validation_is_unwrapped() {
        let core = CoreError::Validation(ValidationError::MustBePositive {
            field: "quantity".into(),
        });
        assert!(matches!(SaleError::from(core), SaleError::Validation(_)));
    }

    #[test]
    fn test_stock_error_mapping() {
        let err = SaleError::from(StockError::Insufficient {
            product_id: "p-9".into(),
            available: 0,
            requested: 1,
        });
        assert!(matches!(err, SaleError::InsufficientStock { available: 0, .. }));

        let err = SaleError::from(StockError::MissingStock {
            product_id: "p-9".into(),
        });
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InsufficientStock).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_STOCK\"");
    }
}
