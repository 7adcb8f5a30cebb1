//! Kernel symbols that loaded programs can be bound to.

/// A low-level kernel entry point that is always offered to loaded programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedFunction {
    pub name: &'static str,
    pub address: u64,
}

/// Source location of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugInfo {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    pub function_address: u64,
}

/// Lookup of kernel functions by name and of source locations by address.
pub trait SymbolResolver {
    fn find_function(&self, name: &str) -> Option<u64>;

    fn resolve_address(&self, address: u64) -> Option<DebugInfo>;
}

/// A resolver that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDebugInfo;

impl SymbolResolver for NoDebugInfo {
    fn find_function(&self, _name: &str) -> Option<u64> {
        None
    }

    fn resolve_address(&self, _address: u64) -> Option<DebugInfo> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSymbol {
    pub name: &'static str,
    pub address: u64,
    pub file: &'static str,
    pub line: u32,
}

/// Resolver over a fixed list of kernel symbols.
#[derive(Debug, Clone, Copy)]
pub struct SymbolTable<'a> {
    symbols: &'a [KernelSymbol],
}

impl<'a> SymbolTable<'a> {
    pub const fn new(symbols: &'a [KernelSymbol]) -> Self {
        Self { symbols }
    }
}

impl SymbolResolver for SymbolTable<'_> {
    fn find_function(&self, name: &str) -> Option<u64> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.address)
            .filter(|&address| address != 0)
    }

    /// The closest symbol starting at or below `address`.
    fn resolve_address(&self, address: u64) -> Option<DebugInfo> {
        self.symbols
            .iter()
            .filter(|s| s.address != 0 && s.address <= address)
            .max_by_key(|s| s.address)
            .map(|s| DebugInfo {
                file: s.file,
                line: s.line,
                function: s.name,
                function_address: s.address,
            })
    }
}
