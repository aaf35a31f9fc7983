//! # Sale Flow
//!
//! The stage machine every sale attempt walks through.
//!
//! ```text
//!  Received ──► Validated ──► Priced ──► StockReserved ──► Persisted ──► ReceiptPending ──► Done
//!     │             │           │  │            │
//!     └─────────────┴───────────┘  │            │
//!              ▼                   └─────┬──────┘
//!          Rejected                      ▼
//!     (bad input, unknown               Failed
//!      product, no stock)         (persistence error)
//! ```
//!
//! A database error before `StockReserved` (lookups, tax configuration)
//! also ends in `Failed`.
//!
//! `Rejected` and `Failed` are terminal and leave no durable trace.
//! `Rejected` from `Priced` covers insufficient stock detected while
//! reserving, since the reservation is rolled back before the stage changes.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Stage of a sale attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStage {
    Received,
    Validated,
    Priced,
    StockReserved,
    Persisted,
    ReceiptPending,
    Done,
    Rejected,
    Failed,
}

impl SaleStage {
    /// Checks if no stage follows this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStage::Done | SaleStage::Rejected | SaleStage::Failed)
    }

    /// Checks if `self -> next` is a legal step.
    pub fn can_transition_to(&self, next: SaleStage) -> bool {
        use SaleStage::*;

        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Priced)
                | (Priced, StockReserved)
                | (StockReserved, Persisted)
                | (Persisted, ReceiptPending)
                | (ReceiptPending, Done)
                | (Received, Rejected)
                | (Validated, Rejected)
                | (Priced, Rejected)
                | (Received, Failed)
                | (Validated, Failed)
                | (Priced, Failed)
                | (StockReserved, Failed)
        )
    }
}

/// Tracks the stage of one sale attempt.
#[derive(Debug, Clone)]
pub struct SaleAttempt {
    stage: SaleStage,
    history: Vec<SaleStage>,
}

impl SaleAttempt {
    /// Starts a new attempt in `Received`.
    pub fn new() -> Self {
        SaleAttempt {
            stage: SaleStage::Received,
            history: vec![SaleStage::Received],
        }
    }

    #[inline]
    pub fn stage(&self) -> SaleStage {
        self.stage
    }

    /// Every stage visited so far, in order.
    pub fn history(&self) -> &[SaleStage] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// ## Errors
    /// `CoreError::InvalidTransition` when the step is not part of the flow.
    pub fn advance(&mut self, next: SaleStage) -> CoreResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }

        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Rejected`.
    pub fn reject(&mut self) -> CoreResult<()> {
        self.advance(SaleStage::Rejected)
    }

    /// Moves to `Failed`.
    pub fn fail(&mut self) -> CoreResult<()> {
        self.advance(SaleStage::Failed)
    }
}

impl Default for SaleAttempt {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
