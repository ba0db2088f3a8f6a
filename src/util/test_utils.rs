use crate::{
    desugar, lexer, parser,
    type_checker::{self, TypeContext},
    util::tree::{ExprTree, ModuleTree},
};

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
    CheckerExpr(&'static str),
    /// Desugared before type checking.
    DesugarExpr(&'static str),
    /// Checked and then lowered to primitive operations.
    LoweredExpr(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    Error(&'static str),
}

/// Runs the stages a test asks for. Returns either the printed tree or the
/// first error, formatted with its `Display` impl.
#[track_caller]
pub fn run_pipeline(test: Test) -> Result<String, String> {
    match test {
        Test::ParserProgram(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let module = parser::parse(&tokens).map_err(|e| e.to_string())?;
            Ok(ModuleTree(&module).to_string())
        }
        Test::ParserExpr(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let expr = parser::parse_expr(&tokens).map_err(|e| e.to_string())?;
            Ok(ExprTree(&expr).to_string())
        }
        Test::CheckerProgram(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let module = parser::parse(&tokens).map_err(|e| e.to_string())?;
            let module = desugar::desugar_before(module);
            let ctx = &mut TypeContext::new();
            let module = type_checker::type_check(module, ctx).map_err(|e| e.to_string())?;
            Ok(ModuleTree(&module).to_string())
        }
        Test::CheckerExpr(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let expr = parser::parse_expr(&tokens).map_err(|e| e.to_string())?;
            let expr = desugar::desugar_expr_before(expr);
            let ctx = &mut TypeContext::new();
            let expr = type_checker::check_expr(expr, ctx).map_err(|e| e.to_string())?;
            Ok(ExprTree(&expr).to_string())
        }
        Test::DesugarExpr(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let expr = parser::parse_expr(&tokens).map_err(|e| e.to_string())?;
            Ok(ExprTree(&desugar::desugar_expr_before(expr)).to_string())
        }
        Test::LoweredExpr(input) => {
            let tokens = lexer::tokenize(input).map_err(|e| e.to_string())?;
            let expr = parser::parse_expr(&tokens).map_err(|e| e.to_string())?;
            let expr = desugar::desugar_expr_before(expr);
            let ctx = &mut TypeContext::new();
            let expr = type_checker::check_expr(expr, ctx).map_err(|e| e.to_string())?;
            Ok(ExprTree(&desugar::desugar_expr_after(expr)).to_string())
        }
    }
}

#[track_caller]
pub fn run_assertion(assertion: Assertion, actual: &Result<String, String>) {
    match assertion {
        Assertion::TreeOk(expected_tree) => match actual {
            Ok(tree) => ::pretty_assertions::assert_eq!(tree.trim(), expected_tree.trim()),
            Err(error) => panic!("expected a tree, got error: {error}"),
        },
        Assertion::Error(expected_error) => match actual {
            Ok(tree) => panic!("expected error `{expected_error}`, got tree:\n{tree}"),
            Err(error) => ::pretty_assertions::assert_eq!(error.as_str(), expected_error),
        },
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let actual = crate::util::test_utils::run_pipeline(test);
                tree_tests!(@@expand_assertions, &actual, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $actual:expr, []) => {};
    (@@expand_assertions, $actual:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $actual,
        );
        tree_tests!(@@expand_assertions, $actual, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, error, $expected:expr) => {
        crate::util::test_utils::Assertion::Error($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
    (@@get_test(checker, expr), $source:expr) => {
        crate::util::test_utils::Test::CheckerExpr($source)
    };
    (@@get_test(desugar, expr), $source:expr) => {
        crate::util::test_utils::Test::DesugarExpr($source)
    };
    (@@get_test(lowered, expr), $source:expr) => {
        crate::util::test_utils::Test::LoweredExpr($source)
    };
}
pub(crate) use tree_tests;

/// Reads an unsigned LEB128 integer, advancing `cursor` past it.
pub fn read_u32(cursor: &mut &[u8]) -> u32 {
    let mut result = 0;
    let mut shift = 0;
    loop {
        let (&byte, rest) = cursor.split_first().expect("truncated integer");
        *cursor = rest;
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return result;
        }
        shift += 7;
    }
}

/// Splits a wasm binary into `(section id, payload)` pairs.
pub fn read_sections(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut cursor = &bytes[8..];
    let mut sections = Vec::new();
    while let Some((&id, rest)) = cursor.split_first() {
        cursor = rest;
        let size = read_u32(&mut cursor) as usize;
        let (payload, rest) = cursor.split_at(size);
        sections.push((id, payload.to_vec()));
        cursor = rest;
    }
    sections
}
