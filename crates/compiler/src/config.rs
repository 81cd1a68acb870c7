//! Generator configuration (§6 External Interfaces).
//!
//! Everything here is input handed to a single `generate(module, config)`
//! call; nothing is process-global. Mirrors the builder-pattern
//! extensibility the rest of this codebase's configuration types use.

use std::path::PathBuf;

/// `mode ∈ {script, module}` -- emit an entry function vs publish exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitMode {
    #[default]
    Script,
    Module,
}

/// `target` -- chooses optimisation flags and target triple; emission
/// shape is otherwise identical across all of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Native,
    WasmBrowser,
    WasmEdge,
    LinuxX64,
    LinuxArm64,
    MacosX64,
    MacosArm64,
    WindowsX64,
}

impl Target {
    pub fn triple(&self) -> &'static str {
        match self {
            Target::Native => "native",
            Target::WasmBrowser => "wasm32-unknown-unknown",
            Target::WasmEdge => "wasm32-wasi",
            Target::LinuxX64 => "x86_64-unknown-linux-gnu",
            Target::LinuxArm64 => "aarch64-unknown-linux-gnu",
            Target::MacosX64 => "x86_64-apple-darwin",
            Target::MacosArm64 => "aarch64-apple-darwin",
            Target::WindowsX64 => "x86_64-pc-windows-msvc",
        }
    }

    /// wasm targets optimise for size; everything else optimises for speed.
    pub fn optimizes_for_size(&self) -> bool {
        matches!(self, Target::WasmBrowser | Target::WasmEdge)
    }
}

/// Declares a C header/library the emitted TL program needs linked, for the
/// `c_library` import strategy (§4.8) and for any `os`-style module.
#[derive(Debug, Clone)]
pub struct CInteropContext {
    pub link_libraries: Vec<String>,
    pub headers: Vec<String>,
}

impl CInteropContext {
    pub fn new() -> Self {
        CInteropContext { link_libraries: Vec::new(), headers: Vec::new() }
    }

    pub fn with_library(mut self, name: impl Into<String>) -> Self {
        self.link_libraries.push(name.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>) -> Self {
        self.headers.push(name.into());
        self
    }
}

impl Default for CInteropContext {
    fn default() -> Self {
        CInteropContext::new()
    }
}

/// Optional sink for source-line -> emitted-line mappings, produced only
/// when `debug` is enabled.
#[derive(Debug, Clone, Default)]
pub struct DebugInfoWriter {
    pub mappings: Vec<(u32, u32)>,
}

impl DebugInfoWriter {
    pub fn record(&mut self, source_line: u32, emitted_line: u32) {
        self.mappings.push((source_line, emitted_line));
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    pub mode: EmitMode,
    pub target: Target,
    pub debug: bool,
    pub emit_bytecode: bool,
    pub force: bool,
    /// Directory the source file lives in, for sibling-module discovery.
    pub source_dir: Option<PathBuf>,
}

impl GeneratorConfig {
    pub fn new() -> Self {
        GeneratorConfig::default()
    }

    pub fn with_mode(mut self, mode: EmitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_emit_bytecode(mut self, emit_bytecode: bool) -> Self {
        self.emit_bytecode = emit_bytecode;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_targets_optimize_for_size() {
        assert!(Target::WasmBrowser.optimizes_for_size());
        assert!(!Target::Native.optimizes_for_size());
    }

    #[test]
    fn builder_chain_sets_all_fields() {
        let config = GeneratorConfig::new()
            .with_mode(EmitMode::Module)
            .with_target(Target::LinuxArm64)
            .with_debug(true)
            .with_force(true);
        assert_eq!(config.mode, EmitMode::Module);
        assert_eq!(config.target, Target::LinuxArm64);
        assert!(config.debug);
        assert!(config.force);
    }
}
