//! # Handles
//!
//! A [Handle] owns at most one reference to an object whose lifetime is governed by an external reference count.
//! The object itself is never freed by tether, that is the objects (or the driver's) business once its count
//! reaches zero.
//!
//! ## Rules
//!
//! - every live, non-null handle contributed exactly one increment to the count of its object,
//! - that increment is given back exactly once: when the handle is dropped, [reset](Handle::reset), assigned away
//!   via [clone_from](Clone::clone_from) or detached via [into_raw](Handle::into_raw).
//!
//! [wrap](Handle::wrap) always adds its own reference. Objects returned from a factory usually carry an initial
//! reference that belongs to the caller. Either [attach](Handle::attach) those, or release the initial reference
//! after wrapping, otherwise the object leaks.
//!
//! ## Equality
//!
//! Two handles are equal if they point to the same address. Proxies for the same remote object, that live at
//! different addresses, compare unequal.

use std::{
    ffi::c_void,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    mem::ManuallyDrop,
    ops::Deref,
    ptr::{self, NonNull},
};

mod guid;
pub use guid::Guid;

///Contract of an externally reference counted object interface.
///
/// # Safety
///
/// `add_ref` and `release` must increment/decrement the reference count of the object behind the pointer. The object
/// must stay valid for as long as the count is greater than zero. A panic in `add_ref` must leave the count untouched.
pub unsafe trait Interface {
    ///Process wide identifier of the interface. Used to request exactly this interface from factories.
    const IID: Guid;

    ///Adds a reference to `this`.
    ///
    /// # Safety
    ///
    /// `this` must point to a live object of this interface.
    unsafe fn add_ref(this: NonNull<Self>);

    ///Releases a reference of `this`. The object might be destroyed afterwards.
    ///
    /// # Safety
    ///
    /// `this` must point to a live object of this interface and the caller must own the released reference.
    unsafe fn release(this: NonNull<Self>);
}

///Owning, reference counted pointer to an object implementing [Interface].
///
/// `Option<NonNull<T>>` has the layout of a nullable `*mut T`, which is what [slot](Handle::slot) relies on.
#[repr(transparent)]
pub struct Handle<T: Interface> {
    raw: Option<NonNull<T>>,
}

//A handle can hand out `&T` and release from any thread, so both need `T: Send + Sync`.
unsafe impl<T: Interface + Send + Sync> Send for Handle<T> {}
unsafe impl<T: Interface + Send + Sync> Sync for Handle<T> {}

impl<T: Interface> Handle<T> {
    ///Creates a null handle. No external call is made.
    pub const fn null() -> Self {
        Handle { raw: None }
    }

    ///Wraps `raw` and adds a reference to it. The caller keeps its own reference.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a live object of interface `T`.
    pub unsafe fn wrap(raw: *mut T) -> Self {
        let raw = NonNull::new(raw);
        if let Some(ptr) = raw {
            unsafe { acquire(ptr) };
        }
        Handle { raw }
    }

    ///Takes over a reference the caller already owns, for instance the initial reference of a freshly created object.
    /// Does not add a reference.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a live object of interface `T`, and the caller must own one reference to it,
    /// which is transferred to the handle.
    pub unsafe fn attach(raw: *mut T) -> Self {
        Handle {
            raw: NonNull::new(raw),
        }
    }

    ///Detaches the raw pointer without releasing. The handle's reference now belongs to the caller.
    pub fn into_raw(self) -> *mut T {
        let this = ManuallyDrop::new(self);
        this.as_raw()
    }

    ///Releases the reference (if any) and leaves a null handle behind. Resetting a null handle is a no-op.
    pub fn reset(&mut self) {
        //take first, so a panicking release can't lead to a second release on drop.
        if let Some(ptr) = self.raw.take() {
            unsafe { release(ptr) };
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    pub fn is_some(&self) -> bool {
        self.raw.is_some()
    }

    ///Raw pointer for interop with API calls. Does not change the reference count, so the pointer is only valid while
    /// this handle (or another reference) is alive.
    pub fn as_raw(&self) -> *mut T {
        self.raw.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    pub fn get(&self) -> Option<&T> {
        //Safety: the handle's reference keeps the object alive.
        self.raw.map(|ptr| unsafe { ptr.as_ref() })
    }

    ///Address of the internal pointer as `void**`, for API calls that return objects via out-parameter.
    ///
    /// The handle must be null, otherwise the current reference would be overwritten and leaked. In
    /// [Full](crate::diagnostics::DiagnosticsMode::Full) mode a non-null handle is a failed assertion, in
    /// [Bare](crate::diagnostics::DiagnosticsMode::Bare) mode the handle is reset first.
    ///
    /// Whatever the API writes into the slot is owned by the handle afterwards, just like [attach](Handle::attach).
    pub fn slot(&mut self) -> *mut *mut c_void {
        crate::tether_assert!(self.is_null());
        if self.raw.is_some() {
            #[cfg(feature = "logging")]
            log::warn!(
                "Handle<{}>::slot called on a non-null handle, releasing previous reference",
                T::IID
            );
            self.reset();
        }

        (&mut self.raw as *mut Option<NonNull<T>>).cast()
    }

    ///Exchanges the pointers of both handles. No reference is acquired or released.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.raw, &mut other.raw);
    }

    ///Identifier of the interface `T`.
    pub const fn iid() -> Guid {
        T::IID
    }

    ///Same as [iid](Handle::iid), but callable on an instance.
    pub fn uuid(&self) -> Guid {
        T::IID
    }
}

///Swaps `lhs` and `rhs` without touching their reference counts.
pub fn swap<T: Interface>(lhs: &mut Handle<T>, rhs: &mut Handle<T>) {
    lhs.swap(rhs);
}

unsafe fn acquire<T: Interface>(ptr: NonNull<T>) {
    unsafe { T::add_ref(ptr) };
    #[cfg(feature = "logging")]
    log::trace!("AddRef {:p} ({})", ptr, T::IID);
}

unsafe fn release<T: Interface>(ptr: NonNull<T>) {
    #[cfg(feature = "logging")]
    log::trace!("Release {:p} ({})", ptr, T::IID);
    unsafe { T::release(ptr) };
}

impl<T: Interface> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Interface> Clone for Handle<T> {
    fn clone(&self) -> Self {
        if let Some(ptr) = self.raw {
            unsafe { acquire(ptr) };
        }
        Handle { raw: self.raw }
    }

    ///Copy-and-swap: if acquiring the new reference panics, `self` is left unchanged. The old reference is released
    /// when the temporary is dropped.
    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        self.swap(&mut tmp);
    }
}

impl<T: Interface> Drop for Handle<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: Interface> Deref for Handle<T> {
    type Target = T;

    ///Dereferencing a null handle is always a failed assertion, regardless of the diagnostics mode.
    fn deref(&self) -> &T {
        match self.raw {
            Some(ptr) => unsafe { ptr.as_ref() },
            None => crate::diagnostics::raise_assertion_failure(
                crate::function_name!(),
                "self.raw.is_some()",
            ),
        }
    }
}

impl<T: Interface> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Interface> Eq for Handle<T> {}

///The hash implementation is based on the wrapped address, matching [PartialEq].
impl<T: Interface> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_raw().hash(state)
    }
}

impl<T: Interface> Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("iid", &format_args!("{}", T::IID))
            .field("raw", &self.as_raw())
            .finish()
    }
}
