//! # Error Types
//!
//! Domain error taxonomy for tavola-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tavola-core errors (this file)                                        │
//! │  ├── CoreError        - Domain rule failures, classified by ErrorKind  │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  tavola-db errors                                                      │
//! │  ├── DbError          - Storage failures                               │
//! │  └── EngineError      - CoreError | DbError, retry classification      │
//! │                                                                         │
//! │  pos-server errors                                                     │
//! │  └── ApiError         - { success: false, message } envelope           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → Client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Kinds
//! | Kind            | Variants                                              |
//! |-----------------|-------------------------------------------------------|
//! | Validation      | Validation, PriceMissing, InvalidMethod, InvalidTransition, PaymentRequired, InvalidLedgerEntry |
//! | NotFound        | NotFound, ItemNotFound, SessionNotFound               |
//! | Conflict        | AlreadyPaid, SessionNotActive, InsufficientStock, OrderLocked, PurchaseAlreadyReversed |
//! | StoreResolution | StoreResolution                                       |

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a domain failure.
///
/// Callers branch on the kind (HTTP status, retry decisions); the variant
/// carries the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    StoreResolution,
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations raised by the order, stock, ledger and checkout flows.
///
/// Every variant aborts the unit of work it is raised in; nothing here is
/// retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed field-level validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A dish, combo or add-on referenced by an order line does not exist.
    #[error("{kind} not found: {id}")]
    ItemNotFound { kind: String, id: String },

    /// The catalog entry exists but carries no price.
    #[error("{kind} {id} has no price")]
    PriceMissing { kind: String, id: String },

    /// Generic lookup failure for orders, stock items, purchases, customers.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// No session could be resolved for a checkout.
    #[error("No active session found for {0}")]
    SessionNotFound(String),

    /// The bill is already settled.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (cash) ──► PAID ──► session closed
    ///      │
    ///      ▼ (double tap / retry)
    /// Checkout again ──► AlreadyPaid ──► { success: false, message: "already paid" }
    /// ```
    #[error("already paid")]
    AlreadyPaid { bill: String },

    /// The session was already closed.
    #[error("Session {0} is not active")]
    SessionNotActive(String),

    /// Consuming more stock than is on hand.
    #[error("Insufficient stock for {stock_id}: available {available}, requested {requested}")]
    InsufficientStock {
        stock_id: String,
        available: i64,
        requested: i64,
    },

    /// The order is past the status that allows the requested change.
    #[error("Order {order_id} is {status} and can no longer be changed")]
    OrderLocked { order_id: String, status: String },

    /// Backward or sideways status move.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// COMPLETED was requested without a payment to attach.
    #[error("Order {order_id} can only be completed through checkout")]
    PaymentRequired { order_id: String },

    /// A purchase was reversed twice.
    #[error("Purchase {0} has already been reversed")]
    PurchaseAlreadyReversed(String),

    /// Unknown or unsupported payment method string.
    #[error("Invalid payment method: {0}")]
    InvalidMethod(String),

    /// Ledger entry type not allowed for this owner, or a bad amount.
    #[error("Invalid ledger entry: {0}")]
    InvalidLedgerEntry(String),

    /// The owning store of a table or session could not be determined.
    #[error("Could not resolve store: {0}")]
    StoreResolution(String),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::PriceMissing { .. }
            | CoreError::InvalidMethod(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::PaymentRequired { .. }
            | CoreError::InvalidLedgerEntry(_) => ErrorKind::Validation,
            CoreError::ItemNotFound { .. }
            | CoreError::NotFound { .. }
            | CoreError::SessionNotFound(_) => ErrorKind::NotFound,
            CoreError::AlreadyPaid { .. }
            | CoreError::SessionNotActive(_)
            | CoreError::InsufficientStock { .. }
            | CoreError::OrderLocked { .. }
            | CoreError::PurchaseAlreadyReversed(_) => ErrorKind::Conflict,
            CoreError::StoreResolution(_) => ErrorKind::StoreResolution,
        }
    }

    /// Machine-readable reason code, finer than [`ErrorKind`].
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::ItemNotFound { .. } => "ITEM_NOT_FOUND",
            CoreError::PriceMissing { .. } => "PRICE_MISSING",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            CoreError::AlreadyPaid { .. } => "ALREADY_PAID",
            CoreError::SessionNotActive(_) => "SESSION_NOT_ACTIVE",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::OrderLocked { .. } => "ORDER_LOCKED",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::PaymentRequired { .. } => "PAYMENT_REQUIRED",
            CoreError::PurchaseAlreadyReversed(_) => "PURCHASE_ALREADY_REVERSED",
            CoreError::InvalidMethod(_) => "INVALID_METHOD",
            CoreError::InvalidLedgerEntry(_) => "INVALID_LEDGER_ENTRY",
            CoreError::StoreResolution(_) => "STORE_RESOLUTION_FAILED",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any row is touched.
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

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two request fields contradict each other.
    #[error("{0}")]
    Conflicting(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_paid_message_is_stable() {
        let err = CoreError::AlreadyPaid {
            bill: "session-1".to_string(),
        };
        assert_eq!(err.to_string(), "already paid");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.code(), "ALREADY_PAID");
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            stock_id: "milk".to_string(),
            available: 300,
            requested: 500,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for milk: available 300, requested 500"
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            CoreError::SessionNotFound("table t1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::StoreResolution("table t1 has no store".into()).code(),
            "STORE_RESOLUTION_FAILED"
        );
        assert_eq!(
            CoreError::InvalidMethod("bitcoin".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CoreError::OrderLocked {
                order_id: "o1".into(),
                status: "SERVED".into()
            }
            .code(),
            "ORDER_LOCKED"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }
}
