//! # Diagnostics
//!
//! Assertions, status checks and explicit throws end up in [raise_assertion_failure], [raise_failure_code] or
//! [raise]. Each builds a [LogicError], logs it and unwinds with the error as panic payload. Use
//! [LogicError::from_panic] to get it back from a caught unwind, or use [ensure_success!](crate::ensure_success) to
//! get a `Result` instead of unwinding. If nobody catches it, the [panic hook](install_panic_hook) prints the error
//! with its call stack.
//!
//! How much context an error carries is decided by the [DiagnosticsMode]. It is selected once via [init]:
//!
//! - [Full](DiagnosticsMode::Full): [tether_assert!](crate::tether_assert) is checked and every raised error
//!   carries the call stack at the point of failure,
//! - [Bare](DiagnosticsMode::Bare): [tether_assert!](crate::tether_assert) is a no-op, stack capture returns
//!   nothing and errors only carry their message.
//!
//! If [init] is never called, the mode follows `debug_assertions`.

use std::{
    io::Write,
    panic::Location,
    sync::{Once, OnceLock},
};

use crate::{error::DiagnosticsError, status::Status, LogicError};

mod capture;
mod resolve;

pub use capture::{capture_stack, capture_stack_with, StackFrame, StackFrames, StackTrace};
pub use resolve::{
    BacktraceResolver, ModuleMap, NullResolver, ResolvedSymbol, SymbolResolver, UNKNOWN_FUNCTION,
    UNKNOWN_MODULE,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticsMode {
    ///Assertions are checked, errors carry a stack trace.
    Full,
    ///Assertions are skipped, errors carry only their message.
    Bare,
}

impl DiagnosticsMode {
    pub const fn from_build() -> Self {
        if cfg!(debug_assertions) {
            DiagnosticsMode::Full
        } else {
            DiagnosticsMode::Bare
        }
    }
}

impl Default for DiagnosticsMode {
    fn default() -> Self {
        Self::from_build()
    }
}

///Diagnostics configuration. Usually created via [DiagnosticsConfig::full], [DiagnosticsConfig::bare] or
/// `Default`, and installed through [init].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    pub mode: DiagnosticsMode,
    ///Upper bound of captured frames per stack walk.
    pub max_frames: usize,
    ///If false, frames only carry their address and the "unknown" sentinels.
    pub resolve_symbols: bool,
}

impl DiagnosticsConfig {
    pub const DEFAULT_MAX_FRAMES: usize = 128;

    pub const fn full() -> Self {
        DiagnosticsConfig {
            mode: DiagnosticsMode::Full,
            max_frames: Self::DEFAULT_MAX_FRAMES,
            resolve_symbols: true,
        }
    }

    pub const fn bare() -> Self {
        DiagnosticsConfig {
            mode: DiagnosticsMode::Bare,
            ..Self::full()
        }
    }

    const fn from_build() -> Self {
        DiagnosticsConfig {
            mode: DiagnosticsMode::from_build(),
            ..Self::full()
        }
    }

    pub fn with_mode(mut self, mode: DiagnosticsMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_symbol_resolution(mut self, resolve_symbols: bool) -> Self {
        self.resolve_symbols = resolve_symbols;
        self
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self::from_build()
    }
}

static CONFIG: OnceLock<DiagnosticsConfig> = OnceLock::new();
static BUILD_CONFIG: DiagnosticsConfig = DiagnosticsConfig::from_build();

///Installs `config` for the rest of the process. Should be called once at start-up, before the first handle or
/// assertion is used.
///
/// # Error
///
/// Returns [AlreadyInitialized](DiagnosticsError::AlreadyInitialized) if a configuration was installed before. The
/// active configuration is not changed in that case.
pub fn init(config: DiagnosticsConfig) -> Result<(), DiagnosticsError> {
    CONFIG.set(config).map_err(|_rejected| {
        #[cfg(feature = "logging")]
        log::warn!("Diagnostics already initialised, ignoring {:?}", _rejected);
        DiagnosticsError::AlreadyInitialized {
            active: self::config().mode,
        }
    })?;

    install_panic_hook();

    #[cfg(feature = "logging")]
    log::info!("Diagnostics initialised: {:?}", config);
    Ok(())
}

///The installed configuration, or the build default if [init] was never called.
pub fn config() -> DiagnosticsConfig {
    *CONFIG.get().unwrap_or(&BUILD_CONFIG)
}

pub fn mode() -> DiagnosticsMode {
    config().mode
}

///Raises a failed assertion of `condition` in `caller`. Never returns.
#[inline(never)]
pub fn raise_assertion_failure(caller: &str, condition: &str) -> ! {
    unwind(LogicError::assertion_below(
        raise_assertion_failure as *const () as usize,
        caller,
        condition,
    ))
}

///Raises the failure `status` returned to `caller`. Never returns.
#[inline(never)]
pub fn raise_failure_code<S: Status>(caller: &str, status: S) -> ! {
    unwind(LogicError::failure_code_below(
        raise_failure_code::<S> as *const () as usize,
        caller,
        status,
    ))
}

///Raises `message` from `caller`, with the call stack attached in [Full](DiagnosticsMode::Full) mode. Never returns.
///
/// Usually called through [tether_throw!](crate::tether_throw).
#[inline(never)]
pub fn raise(caller: &str, message: &str) -> ! {
    unwind(LogicError::raised_below(
        raise as *const () as usize,
        caller,
        message,
    ))
}

fn unwind(error: LogicError) -> ! {
    #[cfg(feature = "logging")]
    log::error!("{}", error);
    install_panic_hook();
    std::panic::panic_any(error)
}

static PANIC_HOOK: Once = Once::new();

///Installs a panic hook that prints an uncaught [LogicError] with its call stack. Any other payload is handed to
/// the hook that was active before.
///
/// Runs once per process, [init] and the first raise call it.
pub fn install_panic_hook() {
    //take_hook panics on a panicking thread
    if std::thread::panicking() {
        return;
    }

    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            match info.payload().downcast_ref::<LogicError>() {
                Some(error) => write_report(&mut std::io::stderr().lock(), info.location(), error),
                None => previous(info),
            }
        }));
    });
}

fn write_report(out: &mut impl Write, location: Option<&Location<'_>>, error: &LogicError) {
    let thread = std::thread::current();
    let name = thread.name().unwrap_or("<unnamed>");
    //nothing left to report to if stderr is gone
    let _ = match location {
        Some(location) => writeln!(out, "thread '{name}' panicked at {location}:\n{error}"),
        None => writeln!(out, "thread '{name}' panicked:\n{error}"),
    };
}

///Name of the surrounding function, including its module path.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        name.strip_suffix("::f").unwrap_or(name)
    }};
}

///Raises a [LogicError](crate::LogicError) if `cond` is false. Only checked in
/// [Full](crate::diagnostics::DiagnosticsMode::Full) mode, `cond` is not evaluated otherwise.
#[macro_export]
macro_rules! tether_assert {
    ($cond:expr $(,)?) => {
        if $crate::diagnostics::mode() == $crate::diagnostics::DiagnosticsMode::Full && !($cond) {
            $crate::diagnostics::raise_assertion_failure(
                $crate::function_name!(),
                ::std::stringify!($cond),
            );
        }
    };
}

///Raises a [LogicError](crate::LogicError) with a formatted message. Raised in every mode, the call stack is only
/// attached in [Full](crate::diagnostics::DiagnosticsMode::Full) mode.
#[macro_export]
macro_rules! tether_throw {
    ($($arg:tt)+) => {
        $crate::diagnostics::raise($crate::function_name!(), &::std::format!($($arg)+))
    };
}

///Raises a [LogicError](crate::LogicError) if `status` is not a success. Checked in every mode.
#[macro_export]
macro_rules! check_success {
    ($status:expr $(,)?) => {{
        let status = $status;
        if !$crate::status::Status::is_success(&status) {
            $crate::diagnostics::raise_failure_code($crate::function_name!(), status);
        }
    }};
}

///Like [check_success!](crate::check_success), but returns `Err` from the enclosing function instead of unwinding.
/// The error type must implement `From<LogicError>`.
#[macro_export]
macro_rules! ensure_success {
    ($status:expr $(,)?) => {{
        let status = $status;
        if !$crate::status::Status::is_success(&status) {
            return ::std::result::Result::Err(
                $crate::LogicError::failure_code($crate::function_name!(), status).into(),
            );
        }
    }};
}
