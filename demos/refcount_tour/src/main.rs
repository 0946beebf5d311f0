//! Walks a reference counted object through the lifetime of a few handles, then shows what a failing status check
//! and a failed assertion look like. The logger runs at trace level, so every AddRef/Release is printed.

use std::{
    ffi::c_void,
    panic::{catch_unwind, AssertUnwindSafe},
    ptr::NonNull,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::Result;
use tether::{
    check_success,
    diagnostics::{self, DiagnosticsConfig},
    ensure_success, Guid, HResult, Handle, Interface, LogicError, Status, TetherError,
};

///Stand-in for an API object. Frees itself once the last reference is released.
struct Texture {
    refs: AtomicU32,
    width: u32,
    height: u32,
}

unsafe impl Interface for Texture {
    const IID: Guid = Guid::from_u128(0x2a4f7c1e_9b3d_4e8a_b6f1_5c0d7e3a9f24);

    unsafe fn add_ref(this: NonNull<Self>) {
        let this = unsafe { this.as_ref() };
        this.refs.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn release(this: NonNull<Self>) {
        let previous = unsafe { this.as_ref() }.refs.fetch_sub(1, Ordering::Release);
        if previous == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            log::info!("Destroying texture {:p}", this);
            drop(unsafe { Box::from_raw(this.as_ptr()) });
        }
    }
}

impl Texture {
    fn refs(&self) -> u32 {
        self.refs.load(Ordering::Relaxed)
    }
}

///Factory in the style of the native API: the interface is requested by id, the object is returned through an
/// out-parameter carrying its initial reference.
unsafe fn create_texture(width: u32, height: u32, iid: &Guid, out: *mut *mut c_void) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    if *iid != Texture::IID {
        return HResult::E_NOINTERFACE;
    }

    let texture = Box::new(Texture {
        refs: AtomicU32::new(1),
        width,
        height,
    });
    unsafe { *out = Box::into_raw(texture).cast() };
    HResult::S_OK
}

fn texture(width: u32, height: u32) -> Result<Handle<Texture>, TetherError> {
    let mut handle = Handle::<Texture>::null();
    ensure_success!(unsafe { create_texture(width, height, &Handle::<Texture>::iid(), handle.slot()) });
    Ok(handle)
}

fn wrong_interface() -> Result<Handle<Texture>, TetherError> {
    let mut handle = Handle::<Texture>::null();
    ensure_success!(unsafe { create_texture(1, 1, &Guid::ZERO, handle.slot()) });
    Ok(handle)
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Trace)
        .init()?;
    diagnostics::init(DiagnosticsConfig::default())?;

    let mut first = Handle::<Texture>::null();
    check_success!(unsafe { create_texture(1024, 768, &Handle::<Texture>::iid(), first.slot()) });
    log::info!(
        "Created {}x{} texture, refs={}",
        first.width,
        first.height,
        first.refs()
    );

    let mut second = first.clone();
    assert_eq!(first, second);
    log::info!("Cloned, refs={}", first.refs());

    let other = texture(64, 64)?;
    second.clone_from(&other);
    assert_ne!(first, second);
    log::info!("Reassigned, refs={} / {}", first.refs(), other.refs());

    first.reset();
    first.reset();
    drop((second, other));

    match wrong_interface() {
        Ok(_) => log::error!("Requesting an unknown interface succeeded"),
        Err(e) => log::warn!("Expected failure:\n{}", e),
    }

    log::info!(
        "E_OUTOFMEMORY translates to: {}",
        HResult::E_OUTOFMEMORY.message()
    );

    //The deliberate failure is reported through the log, silence the default panic print.
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let null = Handle::<Texture>::null();
    let outcome = catch_unwind(AssertUnwindSafe(|| null.width));
    std::panic::set_hook(hook);

    match outcome.map_err(LogicError::from_panic) {
        Err(Ok(err)) => log::info!("Caught {} frame(s) of call stack", err.trace().len()),
        Err(Err(_)) => log::error!("Unexpected panic payload"),
        Ok(width) => log::error!("Null handle dereferenced to width {}", width),
    }

    Ok(())
}
