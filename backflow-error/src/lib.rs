// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions)]
//! Error types for the Backflow operator library
//!
//! This crate provides the error taxonomy shared by every Backflow crate.
//! A single root [`FlowError`] is delivered through `Subscriber::on_error`
//! as the one terminal error signal of a sequence.
//!
//! # Examples
//!
//! ```
//! use backflow_error::{FlowError, Result};
//!
//! fn check_prefetch(prefetch: usize) -> Result<()> {
//!     if prefetch == 0 {
//!         return Err(FlowError::invalid_argument("prefetch", "must be positive"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_prefetch(0).is_err());
//! ```

use std::sync::Arc;

/// Root error type for all Backflow operations
///
/// Every terminal error travelling downstream through an operator chain is a
/// `FlowError`, whether it originated in a producer, in a user callback, or in
/// the operator itself.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A producer terminated its sequence with an error
    ///
    /// This is the general variant for failures raised by sources or by
    /// operators that do not fit the more specific categories.
    #[error("Stream error: {context}")]
    StreamError {
        /// Description of what went wrong
        context: String,
    },

    /// A user-supplied callback (predicate, mapper, combiner) failed
    ///
    /// The shared error is whatever the callback reported. It is reference
    /// counted so a fault fanned out to several consumers keeps its class.
    #[error("User error: {0}")]
    UserError(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// Several failures were accumulated before terminating
    ///
    /// Produced by delay-error merging and by the retry loop when its
    /// predicate itself faults while handling an earlier error.
    #[error("Composite error: {count} errors")]
    Composite {
        /// Number of errors that occurred
        count: usize,
        /// The individual errors, in the order they were observed
        errors: Vec<FlowError>,
    },

    /// The streaming protocol was misused by a caller
    ///
    /// For example a second subscriber attaching to a single-subscriber
    /// processor.
    #[error("Protocol violation: {context}")]
    ProtocolViolation {
        /// Description of the violated rule
        context: String,
    },

    /// An operator was configured with an invalid parameter
    #[error("Invalid argument `{parameter}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter
        parameter: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

impl FlowError {
    /// Create a stream error with the given context
    pub fn stream_error(context: impl Into<String>) -> Self {
        Self::StreamError {
            context: context.into(),
        }
    }

    /// Create a protocol violation error with the given context
    pub fn protocol_violation(context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            context: context.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }

    /// Wrap a user error
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserError(Arc::new(error))
    }

    /// Combine two errors into a [`FlowError::Composite`]
    ///
    /// Nested composites are flattened so the resulting list only holds leaf
    /// errors.
    ///
    /// ```
    /// use backflow_error::FlowError;
    ///
    /// let combined = FlowError::composite(
    ///     FlowError::stream_error("upstream"),
    ///     FlowError::stream_error("predicate"),
    /// );
    /// assert!(matches!(combined, FlowError::Composite { count: 2, .. }));
    /// ```
    #[must_use]
    pub fn composite(first: FlowError, second: FlowError) -> Self {
        Self::from_errors(vec![first, second])
    }

    /// Fold a list of errors into a single terminal error
    ///
    /// A single error is returned as-is; several are flattened into a
    /// [`FlowError::Composite`].
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty.
    #[must_use]
    pub fn from_errors(errors: Vec<FlowError>) -> Self {
        assert!(!errors.is_empty(), "from_errors: at least one error required");

        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Self::Composite { errors, .. } => flat.extend(errors),
                other => flat.push(other),
            }
        }

        if flat.len() == 1 {
            return flat.remove(0);
        }

        Self::Composite {
            count: flat.len(),
            errors: flat,
        }
    }

    /// Returns the leaf errors carried by this error
    ///
    /// A non-composite error yields itself.
    #[must_use]
    pub fn errors(&self) -> &[FlowError] {
        match self {
            Self::Composite { errors, .. } => errors,
            other => core::slice::from_ref(other),
        }
    }

    /// Check if this error was raised by user code
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::UserError(_))
    }

    /// Check if this error indicates misuse of the library rather than a data failure
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. } | Self::InvalidArgument { .. }
        )
    }
}

/// Specialized Result type for Backflow operations
///
/// ```
/// use backflow_error::Result;
///
/// fn is_boundary(value: &i32) -> Result<bool> {
///     Ok(*value == 3)
/// }
/// # assert!(is_boundary(&3).unwrap());
/// ```
pub type Result<T> = std::result::Result<T, FlowError>;

/// Extension trait for converting errors into `FlowError`
///
/// Implemented for every `std::error::Error + Send + Sync + 'static`, which lets
/// callbacks use `?` on foreign errors via `.map_err(IntoFlowError::into_flow)`.
pub trait IntoFlowError {
    /// Convert this error into a `FlowError`
    fn into_flow(self) -> FlowError;
}

impl<E: std::error::Error + Send + Sync + 'static> IntoFlowError for E {
    fn into_flow(self) -> FlowError {
        FlowError::user_error(self)
    }
}

/// Helper trait for adding context to `Result`s
pub trait ResultExt<T> {
    /// Add context to an error
    ///
    /// # Errors
    /// Returns `Err(FlowError)` if the underlying result is `Err`.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FlowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let context = context.into();
            match e.into() {
                FlowError::UserError(inner) => FlowError::StreamError {
                    context: format!("{context}: {inner}"),
                },
                other => other,
            }
        })
    }
}

impl Clone for FlowError {
    fn clone(&self) -> Self {
        match self {
            Self::StreamError { context } => Self::StreamError {
                context: context.clone(),
            },
            Self::UserError(e) => Self::UserError(Arc::clone(e)),
            Self::Composite { count, errors } => Self::Composite {
                count: *count,
                errors: errors.clone(),
            },
            Self::ProtocolViolation { context } => Self::ProtocolViolation {
                context: context.clone(),
            },
            Self::InvalidArgument { parameter, reason } => Self::InvalidArgument {
                parameter,
                reason: reason.clone(),
            },
        }
    }
}
