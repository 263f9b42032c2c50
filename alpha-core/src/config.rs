//! Target and code-generation settings shared by every pass.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Pointer width in bits; also the width of `size` and `ssize`.
    pub pointer_bits: u32,
    /// Emit null and bounds checks on array indexing.
    pub bound_check: bool,
    /// Package name used when mangling free functions.
    pub package: String,
    pub malloc: String,
    pub free: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pointer_bits: 64,
            bound_check: true,
            package: "main".to_string(),
            malloc: "malloc".to_string(),
            free: "free".to_string(),
        }
    }
}

impl Config {
    pub fn with_pointer_bits(mut self, bits: u32) -> Self {
        self.pointer_bits = bits;
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_bound_check(mut self, enabled: bool) -> Self {
        self.bound_check = enabled;
        self
    }

    pub fn pointer_bytes(&self) -> u32 {
        self.pointer_bits / 8
    }

    /// LLVM integer type of `size`, e.g. `i64`.
    pub fn size_llvm(&self) -> String {
        format!("i{}", self.pointer_bits)
    }
}
