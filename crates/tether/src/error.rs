use std::any::Any;

use thiserror::Error;

use crate::{
    diagnostics::{DiagnosticsMode, StackTrace},
    status::Status,
};

///Raised by a failed assertion, a failing status code or an explicit [raise](crate::diagnostics::raise). The
/// `trace` is empty in [Bare](DiagnosticsMode::Bare) mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogicError {
    #[error("{caller}: Assertion '{condition}' failed!{trace}")]
    AssertionFailed {
        caller: String,
        condition: String,
        trace: StackTrace,
    },
    #[error("{caller}: {message}{trace}")]
    FailureCode {
        caller: String,
        code: i64,
        message: String,
        trace: StackTrace,
    },
    #[error("{caller}: {message}{trace}")]
    Raised {
        caller: String,
        message: String,
        trace: StackTrace,
    },
}

impl LogicError {
    ///Builds the error of a failed assertion, capturing the call stack if the active mode asks for it.
    #[inline(never)]
    pub fn assertion(caller: &str, condition: &str) -> Self {
        Self::assertion_below(Self::assertion as *const () as usize, caller, condition)
    }

    ///Builds the error for a failed `status`. The message is the status' translated platform message.
    #[inline(never)]
    pub fn failure_code<S: Status>(caller: &str, status: S) -> Self {
        Self::failure_code_below(
            Self::failure_code::<S> as *const () as usize,
            caller,
            status,
        )
    }

    ///Builds an error carrying `message`.
    #[inline(never)]
    pub fn raised(caller: &str, message: &str) -> Self {
        Self::raised_below(Self::raised as *const () as usize, caller, message)
    }

    //The `*_below` constructors start the trace below the function at `entry`.

    pub(crate) fn assertion_below(entry: usize, caller: &str, condition: &str) -> Self {
        LogicError::AssertionFailed {
            caller: caller.to_owned(),
            condition: condition.to_owned(),
            trace: StackTrace::capture_from(entry),
        }
    }

    pub(crate) fn failure_code_below<S: Status>(entry: usize, caller: &str, status: S) -> Self {
        LogicError::FailureCode {
            caller: caller.to_owned(),
            code: status.code(),
            message: status.message(),
            trace: StackTrace::capture_from(entry),
        }
    }

    pub(crate) fn raised_below(entry: usize, caller: &str, message: &str) -> Self {
        LogicError::Raised {
            caller: caller.to_owned(),
            message: message.to_owned(),
            trace: StackTrace::capture_from(entry),
        }
    }

    pub fn caller(&self) -> &str {
        match self {
            LogicError::AssertionFailed { caller, .. }
            | LogicError::FailureCode { caller, .. }
            | LogicError::Raised { caller, .. } => caller,
        }
    }

    pub fn trace(&self) -> &StackTrace {
        match self {
            LogicError::AssertionFailed { trace, .. }
            | LogicError::FailureCode { trace, .. }
            | LogicError::Raised { trace, .. } => trace,
        }
    }

    ///Recovers the error from the payload of a caught unwind. Hands the payload back if it was something else.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Result<Self, Box<dyn Any + Send>> {
        payload.downcast::<LogicError>().map(|err| *err)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("Diagnostics are already initialised in {active:?} mode")]
    AlreadyInitialized { active: DiagnosticsMode },
}

#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Logic error: {0}")]
    Logic(#[from] LogicError),
    #[error("Diagnostics error: {0}")]
    Diagnostics(#[from] DiagnosticsError),
}
