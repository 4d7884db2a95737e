//! Built-in library images.
//!
//! These modules are generated in memory with `wasm-encoder` rather than
//! read from disk. `core` is referenced by every script through the
//! standard compilation policy; `runtime` and `quill.scripting` are the
//! modules the standard host registry reports as already loaded.
//!
//! Every library function takes and returns `i32`.

use wasm_encoder::{
    BlockType, CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction,
    Module, TypeSection, ValType,
};

pub const CORE_LIBRARY: &str = "core";
pub const RUNTIME_LIBRARY: &str = "runtime";
pub const SCRIPTING_LIBRARY: &str = "quill.scripting";

/// One exported function of a generated library.
#[derive(Debug, Clone)]
pub struct LibraryFunction {
    pub name: &'static str,
    pub params: u32,
    /// Extra `i32` locals beyond the parameters.
    pub locals: u32,
    /// Body without the trailing `end`.
    pub body: Vec<Instruction<'static>>,
}

impl LibraryFunction {
    fn new(name: &'static str, params: u32, body: Vec<Instruction<'static>>) -> Self {
        LibraryFunction {
            name,
            params,
            locals: 0,
            body,
        }
    }

    fn with_locals(mut self, locals: u32) -> Self {
        self.locals = locals;
        self
    }
}

/// Encode a library module exporting `functions` under their names.
pub fn build_library(functions: &[LibraryFunction]) -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    let mut type_of_arity = Vec::new();
    for function in functions {
        let arity = function.params as usize;
        if type_of_arity.len() <= arity {
            type_of_arity.resize(arity + 1, None);
        }
        if type_of_arity[arity].is_none() {
            type_of_arity[arity] = Some(types.len());
            types
                .ty()
                .function(vec![ValType::I32; arity], [ValType::I32]);
        }
    }
    module.section(&types);

    let mut section = FunctionSection::new();
    for function in functions {
        if let Some(type_index) = type_of_arity[function.params as usize] {
            section.function(type_index);
        }
    }
    module.section(&section);

    let mut exports = ExportSection::new();
    for (index, function) in functions.iter().enumerate() {
        exports.export(function.name, ExportKind::Func, index as u32);
    }
    module.section(&exports);

    let mut code = CodeSection::new();
    for function in functions {
        let locals = if function.locals > 0 {
            vec![(function.locals, ValType::I32)]
        } else {
            Vec::new()
        };
        let mut body = Function::new(locals);
        for instruction in &function.body {
            body.instruction(instruction);
        }
        body.instruction(&Instruction::End);
        code.function(&body);
    }
    module.section(&code);

    module.finish()
}

/// `core`: abs, min, max, clamp, sign, pow.
pub fn core_library() -> Vec<u8> {
    use Instruction::*;

    build_library(&[
        LibraryFunction::new(
            "abs",
            1,
            vec![
                I32Const(0),
                LocalGet(0),
                I32Sub,
                LocalGet(0),
                LocalGet(0),
                I32Const(0),
                I32LtS,
                Select,
            ],
        ),
        LibraryFunction::new(
            "min",
            2,
            vec![
                LocalGet(0),
                LocalGet(1),
                LocalGet(0),
                LocalGet(1),
                I32LtS,
                Select,
            ],
        ),
        LibraryFunction::new(
            "max",
            2,
            vec![
                LocalGet(0),
                LocalGet(1),
                LocalGet(0),
                LocalGet(1),
                I32GtS,
                Select,
            ],
        ),
        // clamp(x, lo, hi) = max(min(x, hi), lo)
        LibraryFunction::new(
            "clamp",
            3,
            vec![
                LocalGet(0),
                LocalGet(2),
                LocalGet(0),
                LocalGet(2),
                I32LtS,
                Select,
                LocalTee(3),
                LocalGet(1),
                LocalGet(3),
                LocalGet(1),
                I32GtS,
                Select,
            ],
        )
        .with_locals(1),
        LibraryFunction::new(
            "sign",
            1,
            vec![
                LocalGet(0),
                I32Const(0),
                I32GtS,
                LocalGet(0),
                I32Const(0),
                I32LtS,
                I32Sub,
            ],
        ),
        // Non-positive exponents yield 1.
        LibraryFunction::new(
            "pow",
            2,
            vec![
                I32Const(1),
                LocalSet(2),
                Block(BlockType::Empty),
                Loop(BlockType::Empty),
                LocalGet(1),
                I32Const(0),
                I32LeS,
                BrIf(1),
                LocalGet(2),
                LocalGet(0),
                I32Mul,
                LocalSet(2),
                LocalGet(1),
                I32Const(1),
                I32Sub,
                LocalSet(1),
                Br(0),
                End,
                End,
                LocalGet(2),
            ],
        )
        .with_locals(1),
    ])
}

/// `runtime`: bit operations.
pub fn runtime_library() -> Vec<u8> {
    use Instruction::*;

    build_library(&[
        LibraryFunction::new("popcount", 1, vec![LocalGet(0), I32Popcnt]),
        LibraryFunction::new("leading_zeros", 1, vec![LocalGet(0), I32Clz]),
        LibraryFunction::new("trailing_zeros", 1, vec![LocalGet(0), I32Ctz]),
        LibraryFunction::new("rotate_left", 2, vec![LocalGet(0), LocalGet(1), I32Rotl]),
        LibraryFunction::new("rotate_right", 2, vec![LocalGet(0), LocalGet(1), I32Rotr]),
    ])
}

/// `quill.scripting`: the version of the toolchain compiling the script.
pub fn scripting_library() -> Vec<u8> {
    let part = |value: &str| value.parse::<i32>().unwrap_or(0);
    build_library(&[
        LibraryFunction::new(
            "version_major",
            0,
            vec![Instruction::I32Const(part(env!("CARGO_PKG_VERSION_MAJOR")))],
        ),
        LibraryFunction::new(
            "version_minor",
            0,
            vec![Instruction::I32Const(part(env!("CARGO_PKG_VERSION_MINOR")))],
        ),
        LibraryFunction::new(
            "version_patch",
            0,
            vec![Instruction::I32Const(part(env!("CARGO_PKG_VERSION_PATCH")))],
        ),
    ])
}
