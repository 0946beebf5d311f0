use std::{fmt, iter::FusedIterator, vec};

use super::{
    resolve::{BacktraceResolver, NullResolver, ResolvedSymbol, SymbolResolver},
    DiagnosticsConfig, DiagnosticsMode, UNKNOWN_FUNCTION, UNKNOWN_MODULE,
};

///Single entry of a captured call stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackFrame {
    ///Return address of the frame.
    pub address: u64,
    ///Function name, or [UNKNOWN_FUNCTION].
    pub name: String,
    ///Short name of the module the address belongs to, or [UNKNOWN_MODULE].
    pub module: String,
    ///Source file, empty if unknown.
    pub file: String,
    ///Source line, 0 if unknown.
    pub line: u32,
}

impl StackFrame {
    pub fn from_resolved(address: u64, resolved: ResolvedSymbol) -> Self {
        StackFrame {
            address,
            name: resolved.name.unwrap_or_else(|| UNKNOWN_FUNCTION.to_owned()),
            module: resolved.module.unwrap_or_else(|| UNKNOWN_MODULE.to_owned()),
            file: resolved.file.unwrap_or_default(),
            line: resolved.line.unwrap_or(0),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:x}: {}({}) in {}",
            self.address, self.name, self.line, self.module
        )
    }
}

///Captured, not yet resolved call stack, innermost frame first. Symbols are resolved while iterating.
///
/// The iterator can't be restarted, capture again if needed.
pub struct StackFrames {
    addresses: vec::IntoIter<u64>,
    resolver: Box<dyn SymbolResolver>,
}

impl StackFrames {
    pub fn empty() -> Self {
        StackFrames {
            addresses: Vec::new().into_iter(),
            resolver: Box::new(NullResolver),
        }
    }

    ///Resolves the remaining frames.
    pub fn collect_trace(self) -> StackTrace {
        self.collect()
    }
}

impl Iterator for StackFrames {
    type Item = StackFrame;

    fn next(&mut self) -> Option<StackFrame> {
        let address = self.addresses.next()?;
        Some(StackFrame::from_resolved(
            address,
            self.resolver.resolve(address),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.addresses.size_hint()
    }
}

impl ExactSizeIterator for StackFrames {}
impl FusedIterator for StackFrames {}

impl fmt::Debug for StackFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFrames")
            .field("remaining", &self.addresses.len())
            .finish()
    }
}

///Captures the call stack of the caller with the installed [config](super::config). The frame of this call is not
/// part of the result.
///
/// Empty in [Bare](DiagnosticsMode::Bare) mode.
#[inline(never)]
pub fn capture_stack() -> StackFrames {
    capture_stack_from(capture_stack as *const () as usize)
}

///Captures with the installed config and drops every frame up to and including the one of the function at `entry`.
pub(crate) fn capture_stack_from(entry: usize) -> StackFrames {
    let config = super::config();
    if config.mode == DiagnosticsMode::Bare {
        return StackFrames::empty();
    }

    let resolver: Box<dyn SymbolResolver> = if config.resolve_symbols {
        Box::new(BacktraceResolver::new())
    } else {
        Box::new(NullResolver)
    };
    walk(entry, config.max_frames, resolver)
}

///Same as [capture_stack], but with an explicit `config` and `resolver`.
#[inline(never)]
pub fn capture_stack_with<R: SymbolResolver + 'static>(
    config: &DiagnosticsConfig,
    resolver: R,
) -> StackFrames {
    if config.mode == DiagnosticsMode::Bare {
        return StackFrames::empty();
    }
    walk(
        capture_stack_with::<R> as *const () as usize,
        config.max_frames,
        Box::new(resolver),
    )
}

///Frames between the top of the stack and the entry function: the `backtrace` crate, [walk] and the raising and
/// capturing functions of this crate.
const MACHINERY_DEPTH: usize = 32;

///Walks the stack and drops every frame up to and including the one of `entry`. If `entry` can't be found, the whole
/// stack is kept.
#[inline(never)]
fn walk(entry: usize, max_frames: usize, resolver: Box<dyn SymbolResolver>) -> StackFrames {
    #[cfg(feature = "profiling")]
    puffin::profile_function!();

    let mut addresses: Vec<u64> = Vec::new();
    let mut entry_idx = None;
    backtrace::trace(|frame| {
        if entry_idx.is_none() && frame.symbol_address() as usize == entry {
            entry_idx = Some(addresses.len());
        }
        addresses.push(frame.ip() as usize as u64);

        //the machinery frames don't count towards the limit.
        let budget = entry_idx.map_or(MACHINERY_DEPTH + max_frames, |idx| idx + 1 + max_frames);
        addresses.len() < budget
    });

    //Some unwinders report the ip as symbol address, fall back to the debug info in that case.
    let entry_idx = entry_idx.or_else(|| find_by_symbol(&addresses, entry));
    let skip = entry_idx.map_or(0, |idx| idx + 1);
    let addresses = addresses
        .into_iter()
        .skip(skip)
        .take(max_frames)
        .collect::<Vec<_>>();

    StackFrames {
        addresses: addresses.into_iter(),
        resolver,
    }
}

fn find_by_symbol(addresses: &[u64], entry: usize) -> Option<usize> {
    addresses.iter().take(MACHINERY_DEPTH).position(|&ip| {
        let mut found = false;
        let lookup = (ip as usize).saturating_sub(1) as *mut std::ffi::c_void;
        backtrace::resolve(lookup, |symbol| {
            found |= symbol.addr().is_some_and(|addr| addr as usize == entry);
        });
        found
    })
}

///Resolved call stack, innermost frame first. Displays as an indented `Callstack:` block, or nothing if empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackTrace {
    frames: Vec<StackFrame>,
}

impl StackTrace {
    ///Captures and resolves the current call stack according to the installed config.
    #[inline(never)]
    pub fn capture() -> Self {
        Self::capture_from(Self::capture as *const () as usize)
    }

    ///Like [capture](Self::capture), but the trace starts below the function at `entry`. Used by the raising
    /// functions so that a trace begins at their caller.
    pub(crate) fn capture_from(entry: usize) -> Self {
        capture_stack_from(entry).collect_trace()
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StackFrame> {
        self.frames.iter()
    }
}

impl FromIterator<StackFrame> for StackTrace {
    fn from_iter<I: IntoIterator<Item = StackFrame>>(iter: I) -> Self {
        StackTrace {
            frames: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StackTrace {
    type Item = &'a StackFrame;
    type IntoIter = std::slice::Iter<'a, StackFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frames.is_empty() {
            return Ok(());
        }
        write!(f, "\n\nCallstack:")?;
        for frame in &self.frames {
            write!(f, "\n    {}", frame)?;
        }
        Ok(())
    }
}
