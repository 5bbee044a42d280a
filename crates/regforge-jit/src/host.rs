//! JIT host: module creation, verification, installation and the
//! compiled-artifact handle.
//!
//! Every compile gets a fresh module and generation context. The
//! returned [`CompiledPattern`] is the resource handle: it owns the
//! code memory and releases it when dropped, so the cache's ref-count
//! discipline is the only thing standing between running callers and
//! reclamation.


use std::ffi::CStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use cranelift_codegen::ir::types::{I32, I64};
use cranelift_codegen::ir::{AbiParam, Function, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::verifier::verify_function;
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use tracing::{debug, error};

use regforge_core::{parse, Error, Result};

use crate::codegen::{Codegen, Plan};

/// Global function-id counter; emitted functions are named `match_<n>`.
static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(0);

/// Optimization applied between verification and installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptLevel {
    /// Fastest compiles, straight-line code quality.
    None,
    /// Optimizing pipeline (the default).
    #[default]
    Speed,
}

impl OptLevel {
    fn as_flag(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
        }
    }
}

/// Per-compile knobs.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    /// Log the generated IR before installation.
    pub dump_ir: bool,
}

/// Bounds of a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSpan {
    start: i32,
    end: i32,
}

impl MatchSpan {
    pub fn start(&self) -> usize {
        self.start as usize
    }

    pub fn end(&self) -> usize {
        self.end as usize
    }

    pub fn span(&self) -> (usize, usize) {
        (self.start(), self.end())
    }
}

type MatchFn = unsafe extern "C" fn(*const u8, *mut i32, *mut i32) -> i32;

/// A compiled match function. Owns the JIT module (code memory) plus the
/// literal storage the emitted code points into, and holds the entry
/// address. Dropping the artifact frees the machine code, so it must not
/// be dropped while a caller is inside the function; the compile cache
/// upholds this with its ref-counts.
pub struct CompiledPattern {
    module: Option<JITModule>,
    entry: *const u8,
    name: String,
    _needle: Option<Box<[u8]>>,
}

// SAFETY: the module owns the code memory; `entry` stays valid for the
// artifact's lifetime and the emitted code only reads its inputs.
unsafe impl Send for CompiledPattern {}
unsafe impl Sync for CompiledPattern {}

impl CompiledPattern {
    /// Runs the compiled function against a null-terminated input.
    /// Returns the match bounds, or `None` for no match.
    pub fn invoke(&self, input: &CStr) -> Option<MatchSpan> {
        let mut start: i32 = -1;
        let mut end: i32 = -1;
        let f: MatchFn = unsafe { std::mem::transmute(self.entry) };
        let matched = unsafe { f(input.as_ptr().cast(), &mut start, &mut end) };
        (matched == 1).then_some(MatchSpan { start, end })
    }

    /// Entry address of the emitted function.
    pub fn address(&self) -> usize {
        self.entry as usize
    }

    pub fn function_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .finish()
    }
}

impl Drop for CompiledPattern {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            debug!(function = %self.name, "releasing code memory");
            // SAFETY: the cache only drops artifacts whose ref-count
            // reached zero, so no caller can still be executing.
            unsafe { module.free_memory() };
        }
    }
}

/// Compiles a pattern end to end: parse, lower, verify, optimize,
/// install. Fails without installing anything if any stage fails.
pub fn compile(pattern: &[u8], options: &CompileOptions) -> Result<CompiledPattern> {
    let tree = parse(pattern)?;
    let plan = Plan::select(&tree);
    let needle: Option<Box<[u8]>> = match &plan {
        Plan::Bmh(prefix) => Some(prefix.clone().into_boxed_slice()),
        _ => None,
    };

    let mut module = make_jit_module(options.opt_level)?;
    let ptr_type = module.target_config().pointer_type();
    if ptr_type != I64 {
        return Err(Error::JitInstall(
            "unsupported target: 64-bit pointers required".to_string(),
        ));
    }
    let call_conv = module.target_config().default_call_conv;

    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_type));
    sig.params.push(AbiParam::new(ptr_type));
    sig.params.push(AbiParam::new(ptr_type));
    sig.returns.push(AbiParam::new(I32));

    let function_id = NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed);
    let name = format!("match_{function_id}");
    let func_id = module
        .declare_function(&name, Linkage::Local, &sig)
        .map_err(|e| Error::JitInstall(e.to_string()))?;

    let mut func = Function::with_name_signature(UserFuncName::user(0, function_id as u32), sig);
    let mut fb_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut func, &mut fb_ctx);
        Codegen::emit_function(&mut builder, call_conv, &tree, &plan, needle.as_deref());
        builder.seal_all_blocks();
        builder.finalize();
    }

    if options.dump_ir {
        debug!(function = %name, ir = %func.display(), "generated IR");
    }
    if let Err(errors) = verify_function(&func, module.isa()) {
        let path = std::env::temp_dir().join(format!("{name}.clif"));
        let _ = std::fs::write(&path, func.display().to_string());
        error!(function = %name, path = %path.display(), "IR verification failed: {errors}");
        return Err(Error::Verification {
            function: name,
            details: errors.to_string(),
        });
    }

    let mut ctx = Context::for_function(func);
    module
        .define_function(func_id, &mut ctx)
        .map_err(|e| Error::JitInstall(e.to_string()))?;
    module.clear_context(&mut ctx);
    module
        .finalize_definitions()
        .map_err(|e| Error::JitInstall(e.to_string()))?;
    let entry = module.get_finalized_function(func_id);
    debug!(function = %name, ?plan, "installed match function");

    Ok(CompiledPattern {
        module: Some(module),
        entry,
        name,
        _needle: needle,
    })
}

fn make_jit_module(opt_level: OptLevel) -> Result<JITModule> {
    let mut flag_builder = settings::builder();
    let flags = [
        ("use_colocated_libcalls", "false"),
        ("is_pic", "false"),
        ("opt_level", opt_level.as_flag()),
    ];
    for (flag, value) in flags {
        flag_builder
            .set(flag, value)
            .map_err(|e| Error::JitInstall(e.to_string()))?;
    }
    let isa_builder =
        cranelift_native::builder().map_err(|e| Error::JitInstall(e.to_string()))?;
    let isa = isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| Error::JitInstall(e.to_string()))?;
    let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    Ok(JITModule::new(builder))
}
