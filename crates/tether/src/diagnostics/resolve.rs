use std::path::Path;

use ahash::AHashMap;

pub const UNKNOWN_FUNCTION: &str = "Unknown Function";
pub const UNKNOWN_MODULE: &str = "Unknown Module";

///Everything a resolver could find out about an address. `None` fields are replaced by the sentinels
/// ([UNKNOWN_FUNCTION], [UNKNOWN_MODULE], line 0) when the [StackFrame](super::StackFrame) is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub name: Option<String>,
    pub module: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

///Translates a return address into symbol information.
pub trait SymbolResolver {
    fn resolve(&mut self, address: u64) -> ResolvedSymbol;
}

///Resolves nothing. Used when symbol resolution is disabled, or to simulate stripped binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullResolver;

impl SymbolResolver for NullResolver {
    fn resolve(&mut self, _address: u64) -> ResolvedSymbol {
        ResolvedSymbol::default()
    }
}

///Default resolver. Symbol name, file and line come from the debug info via the `backtrace` crate, the module from
/// the process' [ModuleMap]. Results are cached per address, the module map is loaded on first use.
#[derive(Default)]
pub struct BacktraceResolver {
    modules: Option<ModuleMap>,
    cache: AHashMap<u64, ResolvedSymbol>,
}

impl BacktraceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    ///Uses `modules` instead of loading the module table of the current process.
    pub fn with_modules(modules: ModuleMap) -> Self {
        BacktraceResolver {
            modules: Some(modules),
            cache: AHashMap::default(),
        }
    }

    fn lookup(&mut self, address: u64) -> ResolvedSymbol {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let mut resolved = ResolvedSymbol::default();
        //`address` is a return address, which might already belong to the next line (or function).
        let lookup = address.saturating_sub(1) as usize as *mut std::ffi::c_void;
        backtrace::resolve(lookup, |symbol| {
            //inlined frames call back more than once, the first call is the innermost one.
            if resolved.name.is_none() {
                resolved.name = symbol.name().map(|name| format!("{:#}", name));
            }
            if resolved.file.is_none() {
                resolved.file = symbol.filename().map(|file| file.display().to_string());
            }
            if resolved.line.is_none() {
                resolved.line = symbol.lineno();
            }
        });

        resolved.module = self
            .modules
            .get_or_insert_with(ModuleMap::load)
            .module_for(address)
            .map(str::to_owned);
        resolved
    }
}

impl SymbolResolver for BacktraceResolver {
    fn resolve(&mut self, address: u64) -> ResolvedSymbol {
        if let Some(hit) = self.cache.get(&address) {
            return hit.clone();
        }
        let resolved = self.lookup(address);
        self.cache.insert(address, resolved.clone());
        resolved
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ModuleRegion {
    start: u64,
    end: u64,
    name: String,
}

///Address ranges of the modules (executable and shared libraries) mapped into a process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleMap {
    regions: Vec<ModuleRegion>,
}

impl ModuleMap {
    ///Loads the module table of the current process. Returns an empty map if the platform offers none or it can't
    /// be read, in which case every frame ends up in [UNKNOWN_MODULE].
    pub fn load() -> Self {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/self/maps") {
                Ok(maps) => Self::parse(&maps),
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    log::warn!("Could not read module table, modules stay unknown: {}", _e);
                    Self::default()
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            Self::default()
        }
    }

    ///Parses a table in `/proc/<pid>/maps` format. Anonymous and pseudo mappings (`[stack]`, `[heap]` ...) are
    /// skipped, malformed lines are ignored. The path is the rest of the line, without a trailing ` (deleted)`.
    pub fn parse(maps: &str) -> Self {
        let mut regions = Vec::new();
        for line in maps.lines() {
            let Some((range, mut rest)) = next_field(line) else {
                continue;
            };
            //perms, offset, dev, inode
            for _ in 0..4 {
                rest = next_field(rest).map_or("", |(_, rest)| rest);
            }
            let path = rest.trim_start();
            let path = path.strip_suffix(" (deleted)").unwrap_or(path);
            if !path.starts_with('/') {
                continue;
            }

            let Some((start, end)) = range.split_once('-') else {
                continue;
            };
            let (Ok(start), Ok(end)) = (
                u64::from_str_radix(start, 16),
                u64::from_str_radix(end, 16),
            ) else {
                continue;
            };

            regions.push(ModuleRegion {
                start,
                end,
                name: basename(path).to_owned(),
            });
        }

        regions.sort_by_key(|region| region.start);
        ModuleMap { regions }
    }

    ///Short name of the module containing `address`.
    pub fn module_for(&self, address: u64) -> Option<&str> {
        let idx = self
            .regions
            .partition_point(|region| region.start <= address)
            .checked_sub(1)?;
        let region = &self.regions[idx];
        (address < region.end).then_some(region.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

///Splits off the first whitespace separated field. The remainder keeps its leading whitespace.
fn next_field(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let end = line.find(char::is_whitespace).unwrap_or(line.len());
    (end > 0).then(|| line.split_at(end))
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}
