//! Functions the generated code calls into. Each one is only emitted when
//! some function uses it.

use wasm_encoder::{Function, Instruction, ValType};

use super::{
    function::{load, store, FuncBuilder},
    Generator, Signature, HEAP_POINTER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Helper {
    /// `alloc(size: i32) -> i32`: bump allocates `size` bytes, 8-aligned.
    Alloc,
    /// `str_concat(a: i32, b: i32) -> i32`: a new string holding `a` then `b`.
    StrConcat,
}

impl Helper {
    pub(crate) fn signature(self) -> Signature {
        match self {
            Helper::Alloc => (vec![ValType::I32], vec![ValType::I32]),
            Helper::StrConcat => (vec![ValType::I32, ValType::I32], vec![ValType::I32]),
        }
    }
}

pub(crate) fn emit(helper: Helper, cx: &mut Generator) -> Function {
    match helper {
        Helper::Alloc => alloc(cx),
        Helper::StrConcat => str_concat(cx),
    }
}

fn alloc(cx: &mut Generator) -> Function {
    let mut f = FuncBuilder::new(cx, [("size", Some(ValType::I32))]);
    let ptr = f.new_local(ValType::I32);

    // ptr = heap
    f.emit(Instruction::GlobalGet(HEAP_POINTER));
    f.emit(Instruction::LocalSet(ptr));

    // heap = (heap + size + 7) & !7
    f.emit(Instruction::GlobalGet(HEAP_POINTER));
    f.emit(Instruction::LocalGet(0));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::I32Const(7));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::I32Const(-8));
    f.emit(Instruction::I32And);
    f.emit(Instruction::GlobalSet(HEAP_POINTER));

    f.emit(Instruction::LocalGet(ptr));
    f.finish()
}

fn str_concat(cx: &mut Generator) -> Function {
    let mut f = FuncBuilder::new(cx, [("a", Some(ValType::I32)), ("b", Some(ValType::I32))]);
    let (a, b) = (0, 1);
    let a_len = f.new_local(ValType::I32);
    let b_len = f.new_local(ValType::I32);
    let ptr = f.new_local(ValType::I32);

    f.emit(Instruction::LocalGet(a));
    f.emit(load(ValType::I32, 0));
    f.emit(Instruction::LocalSet(a_len));
    f.emit(Instruction::LocalGet(b));
    f.emit(load(ValType::I32, 0));
    f.emit(Instruction::LocalSet(b_len));

    // ptr = alloc(4 + a_len + b_len)
    f.emit(Instruction::LocalGet(a_len));
    f.emit(Instruction::LocalGet(b_len));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::I32Const(4));
    f.emit(Instruction::I32Add);
    f.call_helper(Helper::Alloc);
    f.emit(Instruction::LocalSet(ptr));

    // ptr.len = a_len + b_len
    f.emit(Instruction::LocalGet(ptr));
    f.emit(Instruction::LocalGet(a_len));
    f.emit(Instruction::LocalGet(b_len));
    f.emit(Instruction::I32Add);
    f.emit(store(ValType::I32, 0));

    // Bytes of `a`
    f.emit(Instruction::LocalGet(ptr));
    f.emit(Instruction::I32Const(4));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::LocalGet(a));
    f.emit(Instruction::I32Const(4));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::LocalGet(a_len));
    f.emit(Instruction::MemoryCopy {
        src_mem: 0,
        dst_mem: 0,
    });

    // Bytes of `b`, right after
    f.emit(Instruction::LocalGet(ptr));
    f.emit(Instruction::I32Const(4));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::LocalGet(a_len));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::LocalGet(b));
    f.emit(Instruction::I32Const(4));
    f.emit(Instruction::I32Add);
    f.emit(Instruction::LocalGet(b_len));
    f.emit(Instruction::MemoryCopy {
        src_mem: 0,
        dst_mem: 0,
    });

    f.emit(Instruction::LocalGet(ptr));
    f.finish()
}
