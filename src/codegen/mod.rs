//! WebAssembly code generation.
//!
//! Layout of the produced module:
//!
//! - function indices: top-level functions in declaration order, followed by
//!   the runtime helpers (`alloc`, `str_concat`) the program actually uses;
//! - global 0 is the heap pointer, followed by one mutable global per
//!   top-level non-function declaration;
//! - one linear memory. Addresses below 8 are never handed out. Static
//!   strings start at 8 and the heap starts at the 8-aligned end of them.
//!
//! Memory representation of values:
//!
//! - `str`: `[len: i32][utf-8 bytes]`;
//! - `[T]`: `[len: i32][pad: 4 bytes][elements]`, 8-byte slots for `float`
//!   elements and 4-byte slots otherwise;
//! - tuples: one 8-byte slot per field.

use std::collections::HashMap;

use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, MemorySection, MemoryType, Module, TypeSection, ValType,
};

use crate::{
    ast::{Expr, ExprKind, Lit, Module as AstModule, PrimOp, Typed},
    error::CodegenError,
    types::Type,
};

mod function;
mod runtime;

use self::{function::FuncBuilder, runtime::Helper};

type Result<T, E = CodegenError> = std::result::Result<T, E>;

/// Size of a wasm page.
pub const PAGE_SIZE: u64 = 64 * 1024;

/// Wasm pages per MiB.
const PAGES_PER_MIB: u64 = 16;

/// Largest memory a 32-bit wasm module can address.
pub const MAX_MEMORY_MIB: u32 = 4096;

/// First address used for static data.
const DATA_START: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Names of the top-level functions to export.
    pub exports: Vec<String>,
    /// Linear memory size in MiB.
    pub memory_size: u32,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            exports: vec!["main".to_owned()],
            memory_size: 128,
        }
    }
}

/// Lowers a fully desugared, typed module to a wasm binary.
pub fn gen_wasm(module: &AstModule<Typed>, options: &Options) -> Result<Vec<u8>> {
    if options.memory_size > MAX_MEMORY_MIB {
        return Err(CodegenError::new(format!(
            "memory size of {} MiB exceeds the maximum of {MAX_MEMORY_MIB} MiB",
            options.memory_size
        )));
    }

    let mut cx = Generator::default();
    cx.declare(module)?;

    let exports = options
        .exports
        .iter()
        .map(|name| match cx.names.get(name.as_str()) {
            Some(TopLevel::Func(index)) => Ok((name.as_str(), *index)),
            _ => Err(CodegenError::new(format!(
                "cannot export {name}: no such function"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    for (i, (name, _)) in exports.iter().enumerate() {
        if exports[..i].iter().any(|(other, _)| other == name) {
            return Err(CodegenError::new(format!("duplicate export {name}")));
        }
    }

    let mut bodies = Vec::with_capacity(cx.funcs.len());
    for func in module.decls.iter().filter_map(|decl| decl.as_func()) {
        // Parameter types were validated in `declare`.
        let params = func
            .params
            .iter()
            .map(|p| (&*p.name.name, val_type(&p.ty.ty).ok().flatten()));
        bodies.push(FuncBuilder::new(&mut cx, params).finish_body(&func.body)?);
    }

    // Helpers may request other helpers while being generated.
    let mut emitted = 0;
    while emitted < cx.helpers.len() {
        let helper = cx.helpers[emitted];
        bodies.push(runtime::emit(helper, &mut cx));
        emitted += 1;
    }

    let heap_start = cx.data_end.next_multiple_of(8);
    let memory_bytes = u64::from(options.memory_size) * PAGES_PER_MIB * PAGE_SIZE;
    if u64::from(heap_start) > memory_bytes {
        return Err(CodegenError::new(format!(
            "static data of {heap_start} bytes does not fit in {} MiB of memory",
            options.memory_size
        )));
    }

    Ok(cx.assemble(&bodies, &exports, heap_start, options.memory_size))
}

/// What a top-level name resolves to.
#[derive(Debug, Clone, Copy)]
enum TopLevel {
    Func(u32),
    Global(u32, ValType),
    /// A `void` declaration; it has no runtime representation.
    Void,
}

/// Index of the heap pointer global.
const HEAP_POINTER: u32 = 0;

/// A function signature as it appears in the type section.
type Signature = (Vec<ValType>, Vec<ValType>);

/// Module-wide state shared by all function builders.
#[derive(Default)]
pub(crate) struct Generator {
    names: HashMap<Box<str>, TopLevel>,
    /// Type index of every function, user functions first.
    funcs: Vec<u32>,
    types: Vec<Signature>,
    /// Initial values of user globals, in index order starting at 1.
    globals: Vec<(ValType, ConstExpr)>,
    /// Helpers in the order they were first requested.
    helpers: Vec<Helper>,
    user_func_count: u32,
    strings: HashMap<Box<str>, u32>,
    data: Vec<(u32, Vec<u8>)>,
    data_end: u32,
}

impl Generator {
    /// Assigns function and global indices to every top-level declaration.
    fn declare(&mut self, module: &AstModule<Typed>) -> Result<()> {
        self.data_end = DATA_START;

        for decl in &module.decls {
            if let Some(func) = decl.as_func() {
                let params = func
                    .params
                    .iter()
                    .map(|param| val_type(&param.ty.ty))
                    .collect::<Result<Vec<_>>>()?;
                let sig = (
                    params.into_iter().flatten().collect(),
                    val_type(&func.ret.ty)?.into_iter().collect(),
                );
                let type_index = self.intern_type(sig);
                let index = self.user_func_count;
                self.funcs.push(type_index);
                self.user_func_count += 1;
                self.names
                    .insert(decl.name.name.clone(), TopLevel::Func(index));
            }
        }

        for decl in &module.decls {
            if decl.as_func().is_some() {
                continue;
            }
            let name = &decl.name.name;
            let Some(ty) = val_type(decl.expr.ty())? else {
                self.names.insert(name.clone(), TopLevel::Void);
                continue;
            };
            let Some(init) = self.const_value(&decl.expr) else {
                return Err(CodegenError::new(format!(
                    "global `{name}` must be initialised with a literal"
                )));
            };
            self.globals.push((ty, init));
            let index = u32::try_from(self.globals.len()).unwrap_or(u32::MAX);
            self.names
                .insert(name.clone(), TopLevel::Global(index, ty));
        }
        Ok(())
    }

    /// Evaluates a global initialiser, which must be a literal or a negated
    /// numeric literal.
    fn const_value(&mut self, expr: &Expr<Typed>) -> Option<ConstExpr> {
        match &expr.kind {
            ExprKind::Lit(Lit::Int(val)) => Some(ConstExpr::i32_const(*val)),
            ExprKind::Lit(Lit::Float(val)) => Some(ConstExpr::f64_const(*val)),
            ExprKind::Lit(Lit::Bool(val)) => Some(ConstExpr::i32_const(i32::from(*val))),
            ExprKind::Lit(Lit::Char(val)) => Some(ConstExpr::i32_const(char_value(*val))),
            ExprKind::Lit(Lit::Str(val)) => {
                Some(ConstExpr::i32_const(address(self.intern_str(val))))
            }
            ExprKind::Prim { op, args } => match (op, args.as_slice()) {
                (PrimOp::I32Sub, [zero, operand])
                    if matches!(zero.kind, ExprKind::Lit(Lit::Int(0))) =>
                {
                    match operand.kind {
                        ExprKind::Lit(Lit::Int(val)) => {
                            Some(ConstExpr::i32_const(val.wrapping_neg()))
                        }
                        _ => None,
                    }
                }
                (PrimOp::F64Neg, [operand]) => match operand.kind {
                    ExprKind::Lit(Lit::Float(val)) => Some(ConstExpr::f64_const(-val)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    fn intern_type(&mut self, sig: Signature) -> u32 {
        let index = match self.types.iter().position(|other| *other == sig) {
            Some(index) => index,
            None => {
                self.types.push(sig);
                self.types.len() - 1
            }
        };
        u32::try_from(index).unwrap_or(u32::MAX)
    }

    /// Places a string in static data, once per distinct content, and returns
    /// its address.
    pub(crate) fn intern_str(&mut self, s: &str) -> u32 {
        if let Some(&addr) = self.strings.get(s) {
            return addr;
        }
        let addr = self.data_end.next_multiple_of(4);
        let len = u32::try_from(s.len()).unwrap_or(u32::MAX);
        let mut bytes = Vec::with_capacity(s.len() + 4);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(s.as_bytes());
        self.data_end = addr.saturating_add(4).saturating_add(len);
        self.data.push((addr, bytes));
        self.strings.insert(s.into(), addr);
        addr
    }

    /// Returns the function index of a helper, scheduling it on first use.
    pub(crate) fn helper(&mut self, helper: Helper) -> u32 {
        let position = match self.helpers.iter().position(|h| *h == helper) {
            Some(position) => position,
            None => {
                self.helpers.push(helper);
                let type_index = self.intern_type(helper.signature());
                self.funcs.push(type_index);
                self.helpers.len() - 1
            }
        };
        self.user_func_count + u32::try_from(position).unwrap_or(u32::MAX)
    }

    fn top_level(&self, name: &str) -> Option<TopLevel> {
        self.names.get(name).copied()
    }

    fn assemble(
        &self,
        bodies: &[Function],
        exports: &[(&str, u32)],
        heap_start: u32,
        memory_size: u32,
    ) -> Vec<u8> {
        let mut module = Module::new();

        let mut types = TypeSection::new();
        for (params, results) in &self.types {
            types.ty().function(params.clone(), results.clone());
        }
        module.section(&types);

        let mut functions = FunctionSection::new();
        for type_index in &self.funcs {
            functions.function(*type_index);
        }
        module.section(&functions);

        let pages = u64::from(memory_size) * PAGES_PER_MIB;
        let mut memories = MemorySection::new();
        memories.memory(MemoryType {
            minimum: pages,
            maximum: Some(pages),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        module.section(&memories);

        let mut globals = GlobalSection::new();
        globals.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(address(heap_start)),
        );
        for (val_type, init) in &self.globals {
            globals.global(
                GlobalType {
                    val_type: *val_type,
                    mutable: true,
                    shared: false,
                },
                init,
            );
        }
        module.section(&globals);

        let mut export_section = ExportSection::new();
        for (name, index) in exports {
            export_section.export(name, ExportKind::Func, *index);
        }
        module.section(&export_section);

        let mut codes = CodeSection::new();
        for body in bodies {
            codes.function(body);
        }
        module.section(&codes);

        if !self.data.is_empty() {
            let mut data = DataSection::new();
            for (addr, bytes) in &self.data {
                data.active(0, &ConstExpr::i32_const(address(*addr)), bytes.clone());
            }
            module.section(&data);
        }

        module.finish()
    }
}

/// Wasm representation of a kou value. `None` for `void`.
pub(crate) fn val_type(ty: &Type) -> Result<Option<ValType>> {
    match ty {
        Type::Void => Ok(None),
        Type::Float => Ok(Some(ValType::F64)),
        Type::Int | Type::Bool | Type::Char | Type::Str | Type::Array(_) | Type::Tuple(_) => {
            Ok(Some(ValType::I32))
        }
        Type::Func(..) => Err(CodegenError::new(format!(
            "values of function type are not supported: {ty}"
        ))),
    }
}

/// Addresses always fit the signed immediates wasm uses for `i32.const`.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn address(addr: u32) -> i32 {
    addr as i32
}

#[allow(clippy::cast_possible_wrap)]
fn char_value(c: char) -> i32 {
    u32::from(c) as i32
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        desugar, lexer, parser,
        type_checker::{self, TypeContext},
        util::test_utils::{read_sections, read_u32},
    };

    fn typed(src: &str) -> AstModule<Typed> {
        let tokens = lexer::tokenize(src).unwrap();
        let module = desugar::desugar_before(parser::parse(&tokens).unwrap());
        type_checker::type_check(module, &mut TypeContext::new()).unwrap()
    }

    fn build(src: &str, options: &Options) -> Result<Vec<u8>> {
        let bytes = gen_wasm(&desugar::desugar_after(typed(src)), options)?;
        if let Err(err) = wasmparser::Validator::new().validate_all(&bytes) {
            panic!("generated an invalid module: {err}");
        }
        Ok(bytes)
    }

    fn section(bytes: &[u8], id: u8) -> Vec<u8> {
        read_sections(bytes)
            .into_iter()
            .find(|(section_id, _)| *section_id == id)
            .map(|(_, payload)| payload)
            .unwrap_or_else(|| panic!("missing section {id}"))
    }

    const MAIN: &str = "let main = fn () int { 1 + 2 }";

    #[test]
    fn header_and_section_order() {
        let bytes = build(MAIN, &Options::default()).unwrap();
        assert_eq!(&bytes[..8], b"\0asm\x01\0\0\0");
        let ids: Vec<u8> = read_sections(&bytes).iter().map(|(id, _)| *id).collect();
        // type, function, memory, global, export, code
        assert_eq!(ids, [1, 3, 5, 6, 7, 10]);
    }

    #[test]
    fn exports_exactly_the_requested_function() {
        let src = "let helper = fn () int { 2 }; let main = fn () int { helper() }";
        let bytes = build(src, &Options::default()).unwrap();
        let exports = section(&bytes, 7);
        // count, name length, name, kind (func), index
        assert_eq!(exports, [1, 4, b'm', b'a', b'i', b'n', 0x00, 1]);
    }

    #[test]
    fn memory_size_in_pages() {
        let bytes = build(MAIN, &Options::default()).unwrap();
        let memory = section(&bytes, 5);
        // count, flags (has maximum), minimum, maximum
        let mut cursor = &memory[..];
        assert_eq!(read_u32(&mut cursor), 1);
        assert_eq!(read_u32(&mut cursor), 1);
        assert_eq!(read_u32(&mut cursor), 2048);
        assert_eq!(read_u32(&mut cursor), 2048);
    }

    #[test]
    fn too_much_memory() {
        let options = Options {
            memory_size: 4097,
            ..Options::default()
        };
        let err = build(MAIN, &options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "codegen error: memory size of 4097 MiB exceeds the maximum of 4096 MiB"
        );
    }

    #[test]
    fn static_data_must_fit_memory() {
        let src = r#"let main = fn () str { "hello" }"#;
        let options = Options {
            memory_size: 0,
            ..Options::default()
        };
        let err = build(src, &options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "codegen error: static data of 24 bytes does not fit in 0 MiB of memory"
        );
    }

    #[test]
    fn unknown_export() {
        let options = Options {
            exports: vec!["start".to_owned()],
            ..Options::default()
        };
        let err = build(MAIN, &options).unwrap_err();
        assert_eq!(err.message, "cannot export start: no such function");
    }

    #[test]
    fn globals_are_not_exportable() {
        let options = Options {
            exports: vec!["answer".to_owned()],
            ..Options::default()
        };
        let src = "let answer = 42; let main = fn () int { answer }";
        let err = build(src, &options).unwrap_err();
        assert_eq!(err.message, "cannot export answer: no such function");
    }

    #[test]
    fn strings_live_in_the_data_section() {
        let src = r#"let greeting = "hi"; let main = fn () str { greeting }"#;
        let bytes = build(src, &Options::default()).unwrap();
        let data = section(&bytes, 11);
        // count, active memory 0, i32.const 8, end, size, [len: 2]["hi"]
        assert_eq!(data, [1, 0, 0x41, 8, 0x0b, 6, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn identical_strings_share_storage() {
        let src = r#"let main = fn () str { let a = "x"; let b = "x"; a }"#;
        let bytes = build(src, &Options::default()).unwrap();
        let data = section(&bytes, 11);
        assert_eq!(data[0], 1);
    }

    #[test]
    fn helpers_are_appended_only_when_used() {
        let count = |bytes: &[u8]| section(bytes, 3)[0];

        let bytes = build(MAIN, &Options::default()).unwrap();
        assert_eq!(count(&bytes), 1);

        // str_concat also pulls in alloc
        let src = r#"let main = fn () str { "a" + "b" }"#;
        let bytes = build(src, &Options::default()).unwrap();
        assert_eq!(count(&bytes), 3);

        let src = "let main = fn () int { let t = (1, 2.5); t[0] }";
        let bytes = build(src, &Options::default()).unwrap();
        assert_eq!(count(&bytes), 2);
    }

    #[test]
    fn identical_signatures_share_a_type() {
        let src = "let f = fn (a int) int { a }; let main = fn (b int) int { f(b) }";
        let bytes = build(src, &Options::default()).unwrap();
        assert_eq!(section(&bytes, 1)[0], 1);
    }

    #[test]
    fn leftover_operators_are_rejected() {
        // Skipping desugar_after leaves `Binary` nodes in the tree.
        let module = typed(MAIN);
        let err = gen_wasm(&module, &Options::default()).unwrap_err();
        assert_eq!(
            err.message,
            "unexpected binary operator `+`; operators must be lowered first"
        );
    }

    #[test]
    fn globals_need_literal_initialisers() {
        let src = "let x = 1 + 2; let main = fn () int { x }";
        let err = crate::compile(src, &Options::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:9: semantic error: global `x` must be initialised with a literal"
        );
    }

    #[test]
    fn negative_literal_globals() {
        let src = "let x = -1; let y = -2.5; let main = fn () int { x }";
        assert!(build(src, &Options::default()).is_ok());
    }

    #[test]
    fn function_values_are_rejected() {
        let src = "let f = fn () int { 1 }; let main = fn () int { let g = f; g() }";
        let err = crate::compile(src, &Options::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1:57: semantic error: function `f` can only be called directly"
        );
    }
}
