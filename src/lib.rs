/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// Desugaring before and after type checking.
pub mod desugar;

/// The type checker takes an untyped AST, checks the soundness of its types,
/// and maps it into a typed AST.
pub mod type_checker;

/// The code generator lowers a typed, desugared AST into a wasm module.
pub mod codegen;

pub mod ast;
pub mod error;
pub mod token;
pub mod types;

pub mod util {
    pub mod tree;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

pub use codegen::Options;
pub use error::Error;

use type_checker::TypeContext;

/// The first four bytes of every wasm binary.
pub const MAGIC_NUMBER: [u8; 4] = *b"\0asm";

/// Runs the whole pipeline on `src`, stopping at the first error.
pub fn compile(src: &str, options: &Options) -> error::Result<Vec<u8>> {
    let tokens = lexer::tokenize(src)?;
    let module = parser::parse(&tokens)?;
    let module = desugar::desugar_before(module);
    let module = type_checker::type_check(module, &mut TypeContext::new())?;
    let module = desugar::desugar_after(module);
    Ok(codegen::gen_wasm(&module, options)?)
}

/// Whether `bytes` starts with the wasm magic number, as opposed to being
/// source text.
pub fn is_bytecode(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC_NUMBER)
}
