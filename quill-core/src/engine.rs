//! The compile step: quill source to a WebAssembly module.
//!
//! A submission module imports the library and host functions it calls
//! and the variables it uses from earlier submissions (as mutable
//! globals), exports one mutable global per declaration, and exports a
//! `main` function that runs the statements in order.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use wasm_encoder::{
    CodeSection, ConstExpr, CustomSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction, Module, NameMap,
    NameSection, TypeSection, ValType,
};

use crate::ast::{BinaryOp, Directive, Expr, ExprKind, Ident, Item, Script};
use crate::config::{CompilationConfiguration, MetadataReference};
use crate::diagnostic::{Diagnostic, has_errors};
use crate::loader::{HOST_MODULE, HostMember, SessionSymbols};
use crate::parser::parse;
use crate::script::ReturnKind;
use crate::source::ScriptSource;
use crate::span::Span;

/// Export name of a submission's entry function.
pub const ENTRY_POINT: &str = "main";

/// Custom section carrying the script's path, encoding and text when
/// debug information is requested.
pub const SOURCE_SECTION: &str = "quill.source";

/// Everything the compile step sees.
#[derive(Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a ScriptSource,
    pub configuration: &'a CompilationConfiguration,
    /// Functions the host exposes under the `host` namespace.
    pub host_members: &'a [HostMember],
    /// Variables declared by earlier submissions of the session.
    pub session: &'a SessionSymbols,
    pub return_kind: ReturnKind,
}

/// Output of the compile step. `wasm` is empty when `diagnostics` holds
/// an error.
#[derive(Debug, Clone, Default)]
pub struct CompiledUnit {
    pub wasm: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
    /// Variables the submission declares, in declaration order.
    pub declarations: Vec<String>,
    /// Libraries the module imports functions from.
    pub libraries: Vec<LibraryImage>,
}

/// A referenced library module, by the namespace scripts call it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryImage {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

/// The compiler engine the orchestrator drives.
pub trait ScriptEngine {
    fn compile(&self, request: CompileRequest<'_>) -> CompiledUnit;
}

/// Compiles the quill language. Library exports are read with `wasmi`.
#[derive(Default)]
pub struct WasmEngine {
    engine: wasmi::Engine,
}

impl WasmEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics about `#r` directives point into the script and go to
    /// `diagnostics`. Those about configured references have no position in
    /// the script and go to `configured`.
    fn load_libraries(
        &self,
        configuration: &CompilationConfiguration,
        directives: &[Directive],
        session: &SessionSymbols,
        diagnostics: &mut Vec<Diagnostic>,
        configured: &mut Vec<Diagnostic>,
    ) -> Vec<Library> {
        let mut references: Vec<(MetadataReference, Option<Span>)> = configuration
            .references()
            .iter()
            .map(|reference| (reference.clone(), None))
            .collect();
        for directive in directives {
            let Directive::Reference { path, span } = directive;
            let reference = MetadataReference::file(configuration.resolution().resolve(path));
            if !references.iter().any(|(known, _)| known.same_as(&reference)) {
                references.push((reference, Some(*span)));
            }
        }

        let mut libraries: Vec<Library> = Vec::new();
        for (reference, span) in references {
            let sink = if span.is_some() {
                &mut *diagnostics
            } else {
                &mut *configured
            };
            let span = span.unwrap_or(Span::empty(0));
            let name = reference.library_name();
            let label = match &reference {
                MetadataReference::File(path) => path.display().to_string(),
                MetadataReference::Image { name, .. } => name.clone(),
            };
            let bytes = match reference.read() {
                Ok(bytes) => bytes,
                Err(err) => {
                    sink.push(Diagnostic::error(
                        "QS0007",
                        format!("reference '{label}' could not be read: {err}"),
                        span,
                    ));
                    continue;
                }
            };
            let module = match wasmi::Module::new(&self.engine, &bytes[..]) {
                Ok(module) => module,
                Err(err) => {
                    sink.push(Diagnostic::error(
                        "QS0007",
                        format!("reference '{label}' is not a valid module: {err}"),
                        span,
                    ));
                    continue;
                }
            };
            if name == HOST_MODULE || libraries.iter().any(|library| library.name == name) {
                sink.push(Diagnostic::error(
                    "QS0008",
                    format!("library name '{name}' is already in use"),
                    span,
                ));
                continue;
            }
            if session.library(&name).is_some_and(|bound| bound != &bytes[..]) {
                sink.push(Diagnostic::error(
                    "QS0008",
                    format!("library name '{name}' is bound to a different module in this session"),
                    span,
                ));
                continue;
            }

            let mut functions = BTreeMap::new();
            for export in module.exports() {
                if let wasmi::ExternType::Func(ty) = export.ty() {
                    let int_params = ty.params().iter().all(|p| *p == wasmi::ValType::I32);
                    if int_params && matches!(ty.results(), [wasmi::ValType::I32]) {
                        functions.insert(export.name().to_string(), ty.params().len() as u32);
                    }
                }
            }
            debug!(library = %name, functions = functions.len(), "loaded reference");
            libraries.push(Library {
                name,
                bytes,
                functions,
            });
        }
        libraries
    }
}

impl ScriptEngine for WasmEngine {
    fn compile(&self, request: CompileRequest<'_>) -> CompiledUnit {
        let text = request.source.text();
        let parsed = parse(text);
        let mut diagnostics = parsed.diagnostics;
        let mut configured = Vec::new();

        let mut unit = CompiledUnit::default();
        if !has_errors(&diagnostics) {
            let libraries = self.load_libraries(
                request.configuration,
                &parsed.script.directives,
                request.session,
                &mut diagnostics,
                &mut configured,
            );
            let mut lowering = Lowering::new(&request, &libraries);
            lowering.lower_script(&parsed.script, request.return_kind, text.len() as u32);
            diagnostics.append(&mut lowering.diagnostics);

            if !has_errors(&diagnostics) && !has_errors(&configured) {
                unit.wasm = encode(&lowering, &request);
                unit.declarations = lowering.declared.clone();
                unit.libraries = libraries
                    .iter()
                    .filter(|library| lowering.uses_module(&library.name))
                    .map(|library| LibraryImage {
                        name: library.name.clone(),
                        bytes: Arc::clone(&library.bytes),
                    })
                    .collect();
            }
        }

        let path = request.configuration.file_path().map(Path::to_path_buf);
        unit.diagnostics = diagnostics
            .into_iter()
            .map(|diagnostic| diagnostic.locate(text, path.as_ref()))
            .chain(configured)
            .collect();
        debug!(
            bytes = unit.wasm.len(),
            diagnostics = unit.diagnostics.len(),
            declarations = unit.declarations.len(),
            "compile step finished"
        );
        unit
    }
}

struct Library {
    name: String,
    bytes: Arc<[u8]>,
    /// Callable exports and their arity.
    functions: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionImport {
    module: String,
    name: String,
    arity: u32,
}

#[derive(Debug, Clone, Copy)]
enum GlobalRef {
    /// Index into the imported session globals.
    Session(usize),
    /// Index into this submission's declarations.
    Declared(usize),
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Const(i32),
    Get(GlobalRef),
    Set(GlobalRef),
    Call(usize),
    Binary(BinaryOp),
    Neg,
    Drop,
}

/// Name resolution and lowering to a flat op list. Global indices stay
/// symbolic until the import count is known.
struct Lowering<'a> {
    libraries: &'a [Library],
    host: &'a [HostMember],
    imports: &'a [String],
    session: &'a SessionSymbols,
    functions: Vec<FunctionImport>,
    /// `(module, name)` of every imported session variable.
    session_globals: Vec<(String, String)>,
    declared: Vec<String>,
    ops: Vec<Op>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lowering<'a> {
    fn new(request: &CompileRequest<'a>, libraries: &'a [Library]) -> Self {
        Lowering {
            libraries,
            host: request.host_members,
            imports: request.configuration.imports(),
            session: request.session,
            functions: Vec::new(),
            session_globals: Vec::new(),
            declared: Vec::new(),
            ops: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn lower_script(&mut self, script: &Script, kind: ReturnKind, end: u32) {
        let trailing = script.trailing_value();
        let body = match trailing {
            Some(_) => &script.items[..script.items.len() - 1],
            None => &script.items[..],
        };
        for item in body {
            self.lower_item(item);
        }

        match (kind, trailing) {
            (ReturnKind::Unit, Some(expr)) => {
                self.lower_expr(expr);
                self.ops.push(Op::Drop);
                self.diagnostics.push(Diagnostic::warning(
                    "QS0102",
                    "the value of the trailing expression is discarded",
                    expr.span,
                ));
            }
            (ReturnKind::Unit, None) => {}
            (ReturnKind::Int, Some(expr)) => self.lower_expr(expr),
            (ReturnKind::Int, None) => self.diagnostics.push(Diagnostic::error(
                "QS0006",
                "the script must end with an expression that produces its result",
                Span::empty(end),
            )),
            (ReturnKind::OptionalInt, Some(expr)) => {
                self.ops.push(Op::Const(1));
                self.lower_expr(expr);
            }
            (ReturnKind::OptionalInt, None) => {
                self.ops.push(Op::Const(0));
                self.ops.push(Op::Const(0));
            }
        }
    }

    fn lower_item(&mut self, item: &Item) {
        match item {
            Item::Declare { name, value } => {
                self.lower_expr(value);
                if let Some(index) = self.declare(name) {
                    self.ops.push(Op::Set(GlobalRef::Declared(index)));
                }
            }
            Item::Assign { name, value } => {
                self.lower_expr(value);
                if let Some(target) = self.resolve_name(name) {
                    self.ops.push(Op::Set(target));
                }
            }
            Item::Expr { expr, .. } => {
                self.lower_expr(expr);
                self.ops.push(Op::Drop);
            }
        }
    }

    fn declare(&mut self, name: &Ident) -> Option<usize> {
        if name.name == ENTRY_POINT {
            self.diagnostics.push(Diagnostic::error(
                "QS0005",
                format!("'{ENTRY_POINT}' is reserved for the entry point"),
                name.span,
            ));
            return None;
        }
        if self.declared.contains(&name.name) {
            self.diagnostics.push(Diagnostic::error(
                "QS0005",
                format!("'{}' is already declared in this script", name.name),
                name.span,
            ));
            return None;
        }
        if self.session.lookup(&name.name).is_some() {
            self.diagnostics.push(Diagnostic::info(
                "QS0201",
                format!(
                    "'{}' shadows a variable declared by an earlier submission",
                    name.name
                ),
                name.span,
            ));
        }
        self.declared.push(name.name.clone());
        Some(self.declared.len() - 1)
    }

    fn resolve_name(&mut self, name: &Ident) -> Option<GlobalRef> {
        if let Some(index) = self.declared.iter().position(|known| *known == name.name) {
            return Some(GlobalRef::Declared(index));
        }
        if let Some(variable) = self.session.lookup(&name.name) {
            let key = (variable.module.clone(), variable.name.clone());
            let index = match self.session_globals.iter().position(|known| *known == key) {
                Some(index) => index,
                None => {
                    self.session_globals.push(key);
                    self.session_globals.len() - 1
                }
            };
            return Some(GlobalRef::Session(index));
        }
        self.diagnostics.push(Diagnostic::error(
            "QS0001",
            format!("the name '{}' does not exist in the current context", name.name),
            name.span,
        ));
        None
    }

    fn lower_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(value) => self.ops.push(Op::Const(*value)),
            ExprKind::Name(name) => {
                let ident = Ident {
                    name: name.clone(),
                    span: expr.span,
                };
                if let Some(source) = self.resolve_name(&ident) {
                    self.ops.push(Op::Get(source));
                }
            }
            ExprKind::Neg(operand) => {
                self.lower_expr(operand);
                self.ops.push(Op::Neg);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.lower_expr(lhs);
                self.lower_expr(rhs);
                if matches!(op, BinaryOp::Div | BinaryOp::Rem) && rhs.is_const_zero() {
                    self.diagnostics.push(Diagnostic::warning(
                        "QS0101",
                        "division by constant zero traps at run time",
                        expr.span,
                    ));
                }
                self.ops.push(Op::Binary(*op));
            }
            ExprKind::Call { path, args } => {
                for arg in args {
                    self.lower_expr(arg);
                }
                if let Some(slot) = self.resolve_call(path, args.len(), expr.span) {
                    self.ops.push(Op::Call(slot));
                }
            }
        }
    }

    fn resolve_call(&mut self, path: &[Ident], arg_count: usize, span: Span) -> Option<usize> {
        let (qualifier, function) = match path {
            [] => return None,
            [function] => (None, function),
            [namespace @ .., function] => (
                Some(
                    namespace
                        .iter()
                        .map(|segment| segment.name.as_str())
                        .collect::<Vec<_>>()
                        .join("."),
                ),
                function,
            ),
        };

        let candidates: Vec<FunctionImport> = match &qualifier {
            Some(module) => self.lookup(module, &function.name).into_iter().collect(),
            None => {
                let mut candidates: Vec<_> =
                    self.lookup(HOST_MODULE, &function.name).into_iter().collect();
                for namespace in self.imports {
                    candidates.extend(self.lookup(namespace, &function.name));
                }
                candidates
            }
        };

        let target = match candidates.as_slice() {
            [] => {
                let shown = match &qualifier {
                    Some(module) => format!("{module}.{}", function.name),
                    None => function.name.clone(),
                };
                self.diagnostics.push(Diagnostic::error(
                    "QS0002",
                    format!("no function named '{shown}' is available"),
                    span,
                ));
                return None;
            }
            [target] => target.clone(),
            many => {
                let shown: Vec<_> = many
                    .iter()
                    .map(|c| format!("{}.{}", c.module, c.name))
                    .collect();
                self.diagnostics.push(Diagnostic::error(
                    "QS0004",
                    format!(
                        "the call to '{}' is ambiguous between {}",
                        function.name,
                        shown.join(" and ")
                    ),
                    span,
                ));
                return None;
            }
        };

        if target.arity as usize != arg_count {
            self.diagnostics.push(Diagnostic::error(
                "QS0003",
                format!(
                    "'{}.{}' takes {} argument(s) but {arg_count} were supplied",
                    target.module, target.name, target.arity
                ),
                span,
            ));
            return None;
        }

        let slot = match self.functions.iter().position(|known| *known == target) {
            Some(slot) => slot,
            None => {
                self.functions.push(target);
                self.functions.len() - 1
            }
        };
        Some(slot)
    }

    fn lookup(&self, module: &str, name: &str) -> Option<FunctionImport> {
        let arity = if module == HOST_MODULE {
            self.host
                .iter()
                .find(|member| member.name == name)
                .map(|member| member.arity)
        } else {
            self.libraries
                .iter()
                .find(|library| library.name == module)
                .and_then(|library| library.functions.get(name).copied())
        };
        Some(FunctionImport {
            module: module.to_string(),
            name: name.to_string(),
            arity: arity?,
        })
    }

    fn uses_module(&self, module: &str) -> bool {
        self.functions.iter().any(|function| function.module == module)
    }

    fn global_index(&self, global: GlobalRef) -> u32 {
        match global {
            GlobalRef::Session(index) => index as u32,
            GlobalRef::Declared(index) => (self.session_globals.len() + index) as u32,
        }
    }
}

fn result_types(kind: ReturnKind) -> Vec<ValType> {
    match kind {
        ReturnKind::Unit => Vec::new(),
        ReturnKind::Int => vec![ValType::I32],
        ReturnKind::OptionalInt => vec![ValType::I32, ValType::I32],
    }
}

fn variable_type() -> GlobalType {
    GlobalType {
        val_type: ValType::I32,
        mutable: true,
        shared: false,
    }
}

#[derive(Serialize)]
struct SourceInfo<'a> {
    path: Option<String>,
    encoding: &'a str,
    text: &'a str,
}

/// The source section, or `None` when `info` cannot be serialized.
fn source_section(info: &impl Serialize) -> Option<CustomSection<'static>> {
    match serde_json::to_vec(info) {
        Ok(data) => Some(CustomSection {
            name: Cow::Borrowed(SOURCE_SECTION),
            data: Cow::Owned(data),
        }),
        Err(err) => {
            warn!(error = %err, "omitting source section");
            None
        }
    }
}

fn encode(lowering: &Lowering<'_>, request: &CompileRequest<'_>) -> Vec<u8> {
    let mut module = Module::new();

    // Type 0 is `main`; imported functions share one type per arity.
    let mut types = TypeSection::new();
    types
        .ty()
        .function(Vec::<ValType>::new(), result_types(request.return_kind));
    let mut type_of_arity = BTreeMap::new();
    for function in &lowering.functions {
        type_of_arity.entry(function.arity).or_insert_with(|| {
            let index = types.len();
            types
                .ty()
                .function(vec![ValType::I32; function.arity as usize], [ValType::I32]);
            index
        });
    }
    module.section(&types);

    let mut imports = ImportSection::new();
    for function in &lowering.functions {
        imports.import(
            &function.module,
            &function.name,
            EntityType::Function(type_of_arity[&function.arity]),
        );
    }
    for (module_name, name) in &lowering.session_globals {
        imports.import(module_name, name, EntityType::Global(variable_type()));
    }
    module.section(&imports);

    let mut functions = FunctionSection::new();
    functions.function(0);
    module.section(&functions);

    let mut globals = GlobalSection::new();
    for _ in &lowering.declared {
        globals.global(variable_type(), &ConstExpr::i32_const(0));
    }
    module.section(&globals);

    let main_index = lowering.functions.len() as u32;
    let mut exports = ExportSection::new();
    exports.export(ENTRY_POINT, ExportKind::Func, main_index);
    for (index, name) in lowering.declared.iter().enumerate() {
        exports.export(
            name,
            ExportKind::Global,
            lowering.global_index(GlobalRef::Declared(index)),
        );
    }
    module.section(&exports);

    let locals: Vec<(u32, ValType)> = Vec::new();
    let mut main = Function::new(locals);
    for op in &lowering.ops {
        match *op {
            Op::Const(value) => {
                main.instruction(&Instruction::I32Const(value));
            }
            Op::Get(global) => {
                main.instruction(&Instruction::GlobalGet(lowering.global_index(global)));
            }
            Op::Set(global) => {
                main.instruction(&Instruction::GlobalSet(lowering.global_index(global)));
            }
            Op::Call(slot) => {
                main.instruction(&Instruction::Call(slot as u32));
            }
            Op::Binary(op) => {
                main.instruction(&match op {
                    BinaryOp::Add => Instruction::I32Add,
                    BinaryOp::Sub => Instruction::I32Sub,
                    BinaryOp::Mul => Instruction::I32Mul,
                    BinaryOp::Div => Instruction::I32DivS,
                    BinaryOp::Rem => Instruction::I32RemS,
                });
            }
            // Wrapping negation: x * -1.
            Op::Neg => {
                main.instruction(&Instruction::I32Const(-1));
                main.instruction(&Instruction::I32Mul);
            }
            Op::Drop => {
                main.instruction(&Instruction::Drop);
            }
        }
    }
    main.instruction(&Instruction::End);
    let mut code = CodeSection::new();
    code.function(&main);
    module.section(&code);

    if request.configuration.emit_debug_information() {
        let mut function_names = NameMap::new();
        for (index, function) in lowering.functions.iter().enumerate() {
            function_names.append(index as u32, &format!("{}.{}", function.module, function.name));
        }
        function_names.append(main_index, ENTRY_POINT);

        let mut global_names = NameMap::new();
        for (index, (_, name)) in lowering.session_globals.iter().enumerate() {
            global_names.append(index as u32, name);
        }
        for (index, name) in lowering.declared.iter().enumerate() {
            global_names.append(lowering.global_index(GlobalRef::Declared(index)), name);
        }

        let mut names = NameSection::new();
        names.functions(&function_names);
        names.globals(&global_names);
        module.section(&names);

        let configuration = request.configuration;
        let info = SourceInfo {
            path: configuration
                .file_path()
                .map(|path| path.display().to_string()),
            encoding: configuration.encoding().name(),
            text: request.source.text(),
        };
        if let Some(section) = source_section(&info) {
            module.section(&section);
        }
    }

    module.finish()
}
