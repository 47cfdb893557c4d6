mod adhoc;
mod already_exists;
mod deleted_twice;
mod invalid_field;
mod invalid_options;
mod invalid_parameter;
mod lock_timeout;
mod model_operation;
mod read_only_write;
mod store_operation;
mod tracked_twice;
mod transaction_failed;

use adhoc::Adhoc;
use already_exists::ModelAlreadyExists;
use deleted_twice::DeletedTwice;
use invalid_field::InvalidField;
use invalid_options::InvalidOptions;
use invalid_parameter::InvalidParameter;
use lock_timeout::LockTimeout;
use model_operation::ModelOperation;
use read_only_write::ReadOnlyWrite;
use store_operation::StoreOperation;
use tracked_twice::ModelTrackedTwice;
use transaction_failed::TransactionFailed;

use std::sync::Arc;

/// An error that can occur in Vellum.
#[derive(Clone)]
pub struct Error {
    inner: Arc<ErrorInner>,
}

/// Trait for types that can be converted into an Error.
pub trait IntoError {
    /// Converts this type into an Error.
    fn into_error(self) -> Error;
}

#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    cause: Option<Error>,
    /// Explicit retry marker. Lock timeouts are retryable regardless.
    retryable: bool,
}

#[derive(Debug)]
enum ErrorKind {
    Adhoc(Adhoc),
    DeletedTwice(DeletedTwice),
    InvalidField(InvalidField),
    InvalidOptions(InvalidOptions),
    InvalidParameter(InvalidParameter),
    LockTimeout(LockTimeout),
    ModelAlreadyExists(ModelAlreadyExists),
    ModelOperation(ModelOperation),
    ModelTrackedTwice(ModelTrackedTwice),
    ReadOnlyWrite(ReadOnlyWrite),
    StoreOperation(StoreOperation),
    TransactionFailed(TransactionFailed),
}

impl Error {
    /// Adds context to this error.
    ///
    /// Context is displayed in reverse order: the most recently added context is shown first,
    /// followed by earlier context, ending with the root cause.
    pub fn context(self, consequent: impl IntoError) -> Error {
        self.context_impl(consequent.into_error())
    }

    fn context_impl(self, consequent: Error) -> Error {
        let mut err = consequent;
        let inner = Arc::get_mut(&mut err.inner).unwrap();
        assert!(
            inner.cause.is_none(),
            "consequent error must not already have a cause"
        );
        inner.cause = Some(self);
        err
    }

    /// Flags this error as safe to retry.
    ///
    /// The transaction retry loop re-runs the caller's closure when the
    /// attempt failed with a retryable error and attempts remain.
    pub fn mark_retryable(mut self) -> Error {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.retryable = true,
            None => {
                // Shared error: attach the marker on a fresh wrapper node.
                return Error {
                    inner: Arc::new(ErrorInner {
                        kind: ErrorKind::Adhoc(Adhoc::message("marked retryable")),
                        cause: Some(self),
                        retryable: true,
                    }),
                };
            }
        }
        self
    }

    /// Returns `true` if the failed attempt may be retried.
    ///
    /// An error is retryable if any error in its cause chain carries the
    /// explicit retry marker or is a transaction lock timeout.
    pub fn is_retryable(&self) -> bool {
        self.chain()
            .any(|err| err.inner.retryable || matches!(err.kind(), ErrorKind::LockTimeout(_)))
    }

    /// Returns the last error in the cause chain.
    pub fn root_cause(&self) -> &Error {
        self.chain().last().unwrap()
    }

    fn chain(&self) -> impl Iterator<Item = &Error> {
        let mut err = self;
        core::iter::once(err).chain(core::iter::from_fn(move || {
            err = err.inner.cause.as_ref()?;
            Some(err)
        }))
    }

    fn kind(&self) -> &ErrorKind {
        &self.inner.kind
    }

    /// Re-classifies a commit-time failure by inspecting the store's error
    /// detail.
    ///
    /// Document stores surface create-collision and lock-contention failures
    /// as generic operation errors with a recognizable detail string. This
    /// maps those signatures onto the structured kinds the caller can act on.
    pub fn classify_commit(self) -> Error {
        if !matches!(
            self.kind(),
            ErrorKind::StoreOperation(_) | ErrorKind::Adhoc(_)
        ) {
            return self;
        }

        let detail = self.to_string();
        if already_exists::matches_store_detail(&detail) {
            let consequent = Error::model_already_exists(detail);
            self.context(consequent)
        } else if lock_timeout::matches_store_detail(&detail) {
            let consequent = Error::lock_timeout(detail);
            self.context(consequent)
        } else if model_operation::matches_store_detail(&detail) {
            let consequent = Error::model_operation(detail);
            self.context(consequent)
        } else {
            self
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::StoreOperation(err) => err.source(),
            _ => None,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut it = self.chain().peekable();
        while let Some(err) = it.next() {
            core::fmt::Display::fmt(err.kind(), f)?;
            if it.peek().is_some() {
                f.write_str(": ")?;
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !f.alternate() {
            core::fmt::Display::fmt(self, f)
        } else {
            f.debug_struct("Error")
                .field("kind", &self.inner.kind)
                .field("retryable", &self.inner.retryable)
                .field("cause", &self.inner.cause)
                .finish()
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use self::ErrorKind::*;

        match self {
            Adhoc(err) => core::fmt::Display::fmt(err, f),
            DeletedTwice(err) => core::fmt::Display::fmt(err, f),
            InvalidField(err) => core::fmt::Display::fmt(err, f),
            InvalidOptions(err) => core::fmt::Display::fmt(err, f),
            InvalidParameter(err) => core::fmt::Display::fmt(err, f),
            LockTimeout(err) => core::fmt::Display::fmt(err, f),
            ModelAlreadyExists(err) => core::fmt::Display::fmt(err, f),
            ModelOperation(err) => core::fmt::Display::fmt(err, f),
            ModelTrackedTwice(err) => core::fmt::Display::fmt(err, f),
            ReadOnlyWrite(err) => core::fmt::Display::fmt(err, f),
            StoreOperation(err) => core::fmt::Display::fmt(err, f),
            TransactionFailed(err) => core::fmt::Display::fmt(err, f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Arc::new(ErrorInner {
                kind,
                cause: None,
                retryable: false,
            }),
        }
    }
}

impl IntoError for Error {
    fn into_error(self) -> Error {
        self
    }
}
