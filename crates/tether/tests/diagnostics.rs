use std::{hint::black_box, panic::catch_unwind};

use tether::{
    check_success,
    diagnostics::{
        self, capture_stack, capture_stack_with, DiagnosticsConfig, DiagnosticsMode, NullResolver,
        StackFrame, UNKNOWN_FUNCTION, UNKNOWN_MODULE,
    },
    ensure_success, tether_assert, tether_throw, HResult, LogicError, TetherError,
};

fn setup() {
    //every test in this binary wants the full mode, the first one to run installs it.
    let _ = diagnostics::init(DiagnosticsConfig::full());
    assert_eq!(diagnostics::mode(), DiagnosticsMode::Full);
}

#[inline(never)]
fn recurse(depth: usize) -> Vec<StackFrame> {
    if depth == 0 {
        capture_stack().collect()
    } else {
        black_box(recurse(black_box(depth - 1)))
    }
}

#[test]
fn capture_of_known_depth() {
    setup();
    const DEPTH: usize = 5;
    let frames = recurse(DEPTH);

    assert!(frames[0].name.contains("recurse"), "{:#?}", frames[0]);
    let recursion = frames
        .iter()
        .take_while(|frame| frame.name.contains("recurse"))
        .count();
    assert_eq!(recursion, DEPTH + 1);
    assert!(frames[DEPTH + 1].name.contains("capture_of_known_depth"));
    assert!(frames.iter().all(|frame| !frame.name.contains("capture_stack")));
}

#[test]
fn stripped_symbols_use_sentinels() {
    setup();
    let config = DiagnosticsConfig::full().with_max_frames(8);
    let frames = capture_stack_with(&config, NullResolver).collect::<Vec<_>>();

    assert!(!frames.is_empty());
    assert!(frames.len() <= 8);
    for frame in &frames {
        assert_eq!(frame.name, UNKNOWN_FUNCTION);
        assert_eq!(frame.module, UNKNOWN_MODULE);
        assert_eq!(frame.line, 0);
        assert_ne!(frame.address, 0);
    }
}

#[test]
fn assertion_message_has_trace() {
    setup();
    let result: std::thread::Result<()> =
        catch_unwind(|| diagnostics::raise_assertion_failure("Foo", "x != null"));
    let err = LogicError::from_panic(result.unwrap_err()).unwrap();

    let msg = err.to_string();
    assert!(msg.starts_with("Foo: Assertion 'x != null' failed!"), "{msg}");
    assert!(msg.contains("\n\nCallstack:\n    0x"), "{msg}");
    assert!(!err.trace().is_empty());
    assert!(
        err.trace()
            .iter()
            .any(|frame| frame.name.contains("assertion_message_has_trace"))
    );
}

#[test]
fn raised_trace_starts_at_caller() {
    setup();
    let result: std::thread::Result<()> =
        catch_unwind(|| diagnostics::raise_assertion_failure("Foo", "x != null"));
    let err = LogicError::from_panic(result.unwrap_err()).unwrap();

    let first = &err.trace().frames()[0];
    assert!(first.name.contains("raised_trace_starts_at_caller"), "{err}");
    assert!(
        err.trace().iter().all(|frame| !frame.name.contains("raise_assertion_failure")
            && !frame.name.contains("LogicError")
            && !frame.name.contains("StackTrace")),
        "{err}"
    );
}

#[test]
fn uncaught_raise_keeps_message() {
    setup();
    let payload = std::thread::spawn(|| {
        diagnostics::raise_assertion_failure("Foo", "x != null");
    })
    .join()
    .unwrap_err();

    let msg = LogicError::from_panic(payload).unwrap().to_string();
    assert!(msg.starts_with("Foo: Assertion 'x != null' failed!"), "{msg}");
    assert!(msg.contains("Callstack:"), "{msg}");
}

#[inline(never)]
fn parse_width(text: &str) -> u32 {
    match text.parse() {
        Ok(width) => width,
        Err(e) => tether_throw!("'{}' is no width: {}", text, e),
    }
}

#[test]
fn throw_carries_trace() {
    setup();
    assert_eq!(parse_width("64"), 64);

    let result = catch_unwind(|| parse_width("wide"));
    let err = LogicError::from_panic(result.unwrap_err()).unwrap();
    match &err {
        LogicError::Raised {
            caller, message, ..
        } => {
            assert!(caller.ends_with("parse_width"), "{caller}");
            assert!(message.starts_with("'wide' is no width: "), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.trace().frames()[0].name.contains("parse_width"), "{err}");
    assert!(err.to_string().contains("\n\nCallstack:\n    0x"), "{err}");
}

#[test]
fn tether_assert_raises_in_full_mode() {
    setup();
    let value: Option<u32> = None;
    let result = catch_unwind(|| tether_assert!(value.is_some()));
    let err = LogicError::from_panic(result.unwrap_err()).unwrap();
    match err {
        LogicError::AssertionFailed {
            caller, condition, ..
        } => {
            assert_eq!(condition, "value.is_some()");
            assert!(caller.contains("tether_assert_raises_in_full_mode"), "{caller}");
        }
        other => panic!("unexpected {other:?}"),
    }

    tether_assert!(value.is_none());
}

#[test]
fn failure_code_raises_translated_message() {
    setup();
    let result = catch_unwind(|| check_success!(HResult::E_FAIL));
    let err = LogicError::from_panic(result.unwrap_err()).unwrap();
    let msg = err.to_string();
    assert!(msg.contains("Unspecified error"), "{msg}");
    assert!(msg.contains("Callstack:"), "{msg}");
}

fn open_device(status: HResult) -> Result<&'static str, TetherError> {
    ensure_success!(status);
    Ok("device")
}

#[test]
fn ensure_success_converts_into_crate_error() {
    setup();
    assert_eq!(open_device(HResult::S_OK).unwrap(), "device");
    match open_device(HResult::E_OUTOFMEMORY) {
        Err(TetherError::Logic(LogicError::FailureCode { caller, code, .. })) => {
            assert!(caller.ends_with("open_device"), "{caller}");
            assert_eq!(code, HResult::E_OUTOFMEMORY.0 as i64);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn second_init_is_rejected() {
    setup();
    let err = diagnostics::init(DiagnosticsConfig::bare()).unwrap_err();
    assert!(matches!(
        err,
        tether::DiagnosticsError::AlreadyInitialized {
            active: DiagnosticsMode::Full
        }
    ));
    assert_eq!(diagnostics::mode(), DiagnosticsMode::Full);
}
