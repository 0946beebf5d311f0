//! # Tether
//!
//! Small helpers for graphics APIs whose objects keep their own, external reference count (COM style
//! `AddRef`/`Release`).
//!
//! # Usage
//!
//! Every object interface you want to hold implements [Interface]. A [Handle] then takes care of the reference count:
//! cloning a handle acquires a reference, dropping or [resetting](Handle::reset) it releases that reference exactly once.
//! Wrapper types around an API object usually hold one or more handles and never balance `AddRef`/`Release` by hand.
//!
//! Fallible entry points funnel their failures through [diagnostics]. Depending on the [DiagnosticsMode](diagnostics::DiagnosticsMode)
//! that was selected at start-up, a failed [tether_assert!], [check_success!] or [tether_throw!] raises a [LogicError] that carries
//! the captured call stack, or just the bare message.
//!
//! ```ignore
//! let mut factory = Handle::<IFactory>::null();
//! check_success!(unsafe { create_factory(&Handle::<IFactory>::iid(), factory.slot()) });
//! let copy = factory.clone(); //AddRef
//! drop(factory); //Release
//! ```

pub use ash;

///The reference counted [Handle] as well as the [Interface] contract an object type has to fulfill.
pub mod handle;

///Call-stack capture, runtime diagnostics mode and the raising entry points used by assertions and status checks.
pub mod diagnostics;

///Status code contract ([Status]) and the status types of the supported APIs.
pub mod status;

///UTF-8 to UTF-16 and back, for wide-character APIs.
pub mod text;

mod error;
pub use error::{DiagnosticsError, LogicError, TetherError};

pub use handle::{Guid, Handle, Interface};
pub use status::{HResult, OsError, Status};
