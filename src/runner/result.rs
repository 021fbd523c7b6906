use std::any::Any;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Boxed error returned by a failing spec or hook.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Result every spec and hook body returns.
pub type UnitResult = Result<(), Interrupt>;

/// Early exit from a spec or hook body.
///
/// `Skip` is the dynamic-skip signal and is never treated as a failure
/// inside a spec. `Fail` carries an ordinary error. Any `std::error::Error`
/// converts into `Fail`, so `?` works inside bodies.
#[derive(Debug)]
pub enum Interrupt {
    Skip(Option<String>),
    Fail(BoxError),
}

impl Interrupt {
    /// Fail with a plain message.
    pub fn fail(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Fail(message.into())
    }

    /// Dynamic skip with an optional reason; an empty reason counts as none.
    pub fn skip(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Skip((!reason.is_empty()).then_some(reason))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

impl<E> From<E> for Interrupt
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::Fail(Box::new(error))
    }
}

/// Abort the current spec with a skip outcome.
///
/// ```
/// # use dagspec::{UnitResult, skip_test};
/// fn needs_network(online: bool) -> UnitResult {
///     if !online {
///         return skip_test("offline");
///     }
///     Ok(())
/// }
/// assert!(needs_network(false).unwrap_err().is_skip());
/// ```
pub fn skip_test(reason: impl Into<String>) -> UnitResult {
    Err(Interrupt::skip(reason))
}

/// Outcome of running one callable under the timeout executor.
#[derive(Debug)]
pub enum Execution {
    Completed,
    Skipped(Option<String>),
    Failed(Failure),
}

/// Why a callable failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("timeout occurred after {} ms", timeout.as_millis()),
        }
    }

    pub fn error(error: &BoxError) -> Self {
        Self {
            kind: FailureKind::Error,
            message: error.to_string(),
        }
    }

    /// Build a failure from a caught panic payload.
    pub fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic with non-string payload".to_owned()
        };
        Self {
            kind: FailureKind::Panic,
            message,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of callable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The body returned `Err(Interrupt::Fail(_))`.
    Error,
    /// The body panicked, e.g. a failed `assert!`.
    Panic,
    /// The deadline elapsed first.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Panic => write!(f, "panic"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}
