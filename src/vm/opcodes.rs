/*
Opcode definitions and handler dispatch. Grounded in
`original_source/src/libchidb/dbm-ops.c`: handler bodies below follow that
file's `chidb_dbm_op_*` functions opcode-for-opcode, including the
jump convention (`stmt->pc = op->p2` on the condition the comment
documents) and the type-mismatch-is-an-error behavior of the comparison
family (`CHIDB_EPARSE`). `MakeRecord`, `Insert`, `CreateTable`,
`CreateIndex`, `Copy`, `SCopy` are stubs in the reference (`/* Your code
goes here */`); this repo gives them concrete semantics, documented
per-handler below.
*/

use crate::cell::{Cell, NodeType};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::sql_data_types::SerialData;

use super::{Op, Register, Step, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    OpenRead,
    OpenWrite,
    Close,
    Rewind,
    Next,
    Prev,
    Seek,
    SeekGt,
    SeekGe,
    SeekLt,
    SeekLe,
    Column,
    Key,
    Integer,
    String,
    Null,
    ResultRow,
    MakeRecord,
    Insert,
    CreateTable,
    CreateIndex,
    Copy,
    SCopy,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IdxGt,
    IdxGe,
    IdxLt,
    IdxLe,
    IdxPKey,
    IdxInsert,
    Halt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum P4 {
    Text(String),
}

type Handler = fn(&mut Vm, &Op) -> Result<Step>;

const HANDLERS: [Handler; 36] = [
    op_open_read,
    op_open_write,
    op_close,
    op_rewind,
    op_next,
    op_prev,
    op_seek,
    op_seek_gt,
    op_seek_ge,
    op_seek_lt,
    op_seek_le,
    op_column,
    op_key,
    op_integer,
    op_string,
    op_null,
    op_result_row,
    op_make_record,
    op_insert,
    op_create_table,
    op_create_index,
    op_copy,
    op_scopy,
    op_eq,
    op_ne,
    op_lt,
    op_le,
    op_gt,
    op_ge,
    op_idx_gt,
    op_idx_ge,
    op_idx_lt,
    op_idx_le,
    op_idx_pkey,
    op_idx_insert,
    op_halt,
];

pub fn dispatch(vm: &mut Vm, op: &Op) -> Result<Step> {
    HANDLERS[op.opcode as usize](vm, op)
}

fn cursor_or(vm: &mut Vm, idx: usize) -> Result<()> {
    if vm.cursors[idx].is_none() {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// p1: cursor index. p2: register holding the tree's root page number.
fn op_open_read(vm: &mut Vm, op: &Op) -> Result<Step> {
    let root = vm.register(op.p2 as usize).as_i32()? as crate::pager::PageNum;
    vm.open_cursor(op.p1 as usize, root);
    Ok(Step::Continue)
}

fn op_open_write(vm: &mut Vm, op: &Op) -> Result<Step> {
    op_open_read(vm, op)
}

fn op_close(vm: &mut Vm, op: &Op) -> Result<Step> {
    vm.close_cursor(op.p1 as usize);
    Ok(Step::Continue)
}

/// p1: cursor. p2: jump addr if the tree is empty.
fn op_rewind(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let has_row = vm.cursors[idx].as_mut().unwrap().rewind(&mut vm.bt)?;
    if !has_row {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

/// p1: cursor. p2: jump addr to loop back to if the cursor advanced.
fn op_next(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let advanced = vm.cursors[idx].as_mut().unwrap().next(&mut vm.bt)?;
    if advanced {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_prev(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let advanced = vm.cursors[idx].as_mut().unwrap().prev(&mut vm.bt)?;
    if advanced {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

/// p1: cursor. p2: jump addr if not found. p3: register holding the key.
fn op_seek(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let key = vm.register(op.p3 as usize).as_i32()? as i64;
    let found = vm.cursors[idx].as_mut().unwrap().seek_eq(&mut vm.bt, key)?;
    if !found {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_seek_gt(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let key = vm.register(op.p3 as usize).as_i32()? as i64;
    let found = vm.cursors[idx].as_mut().unwrap().seek_gt(&mut vm.bt, key)?;
    if !found {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_seek_ge(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let key = vm.register(op.p3 as usize).as_i32()? as i64;
    let found = vm.cursors[idx].as_mut().unwrap().seek_ge(&mut vm.bt, key)?;
    if !found {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_seek_lt(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let key = vm.register(op.p3 as usize).as_i32()? as i64;
    let found = vm.cursors[idx].as_mut().unwrap().seek_lt(&mut vm.bt, key)?;
    if !found {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_seek_le(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let key = vm.register(op.p3 as usize).as_i32()? as i64;
    let found = vm.cursors[idx].as_mut().unwrap().seek_le(&mut vm.bt, key)?;
    if !found {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

/// p1: cursor. p2: column index into the cursor's current row record.
/// p3: destination register.
fn op_column(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let cell = vm.cursors[idx].as_ref().unwrap().current()?;
    let data = match cell {
        Cell::TableLeaf { data, .. } => data,
        _ => return Err(Error::Parse("Column requires a table-leaf cursor".into())),
    };
    let (record, _) = Record::from_be_bytes(&data)?;
    let col = record
        .serial_data
        .get(op.p2 as usize)
        .ok_or_else(|| Error::Parse(format!("column {} out of range", op.p2)))?;
    let reg = match col {
        SerialData::Null => Register::Null,
        SerialData::I8(v) => Register::Int32(*v as i32),
        SerialData::I16(v) => Register::Int32(*v as i32),
        SerialData::I24(v) => Register::Int32(*v),
        SerialData::I32(v) => Register::Int32(*v),
        SerialData::I48(v) => Register::Int32(*v as i32),
        SerialData::I64(v) => Register::Int32(*v as i32),
        SerialData::Text(s) => Register::Str(s.clone()),
        other => return Err(Error::Parse(format!("unsupported column type {other:?}"))),
    };
    vm.set_register(op.p3 as usize, reg);
    Ok(Step::Continue)
}

/// p1: cursor. p2: destination register for the row key.
fn op_key(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let cell = vm.cursors[idx].as_ref().unwrap().current()?;
    vm.set_register(op.p2 as usize, Register::Int32(cell.key() as i32));
    Ok(Step::Continue)
}

fn op_integer(vm: &mut Vm, op: &Op) -> Result<Step> {
    vm.set_register(op.p2 as usize, Register::Int32(op.p1));
    Ok(Step::Continue)
}

fn op_string(vm: &mut Vm, op: &Op) -> Result<Step> {
    let text = match &op.p4 {
        Some(P4::Text(s)) => s.clone(),
        None => return Err(Error::Parse("String op missing p4 text".into())),
    };
    vm.set_register(op.p2 as usize, Register::Str(text));
    Ok(Step::Continue)
}

fn op_null(vm: &mut Vm, op: &Op) -> Result<Step> {
    vm.set_register(op.p2 as usize, Register::Null);
    Ok(Step::Continue)
}

/// p1: first result register. p2: number of result columns.
fn op_result_row(vm: &mut Vm, op: &Op) -> Result<Step> {
    vm.set_result_row(op.p1 as usize, op.p2 as usize);
    Ok(Step::Row)
}

/// p1: first source register. p2: register count. p3: destination
/// register, receiving the encoded record bytes (`Register::Record`).
fn op_make_record(vm: &mut Vm, op: &Op) -> Result<Step> {
    let start = op.p1 as usize;
    let count = op.p2 as usize;
    let mut cols = Vec::with_capacity(count);
    for i in start..start + count {
        cols.push(match vm.register(i) {
            Register::Null => SerialData::Null,
            Register::Int32(v) => SerialData::I32(*v),
            Register::Str(s) => SerialData::Text(s.clone()),
            Register::Record(_) => return Err(Error::Parse("cannot nest a record inside a record".into())),
        });
    }
    let bytes = Record::new(cols).to_be_bytes();
    vm.set_register(op.p3 as usize, Register::Record(bytes));
    Ok(Step::Continue)
}

/// p1: cursor (identifies the target table tree). p2: register holding the
/// row key. p3: register holding the record bytes.
fn op_insert(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let root = vm.cursors[idx].as_ref().unwrap().root();
    let key = vm.register(op.p2 as usize).as_i32()?;
    let data = vm.register(op.p3 as usize).as_bytes()?.to_vec();
    vm.bt.insert(root, Cell::TableLeaf { key, data })?;
    Ok(Step::Continue)
}

/// p1: destination register for the new root page number.
fn op_create_table(vm: &mut Vm, op: &Op) -> Result<Step> {
    let root = vm.bt.create_root(NodeType::TableLeaf)?;
    vm.set_register(op.p1 as usize, Register::Int32(root as i32));
    Ok(Step::Continue)
}

fn op_create_index(vm: &mut Vm, op: &Op) -> Result<Step> {
    let root = vm.bt.create_root(NodeType::IndexLeaf)?;
    vm.set_register(op.p1 as usize, Register::Int32(root as i32));
    Ok(Step::Continue)
}

fn op_copy(vm: &mut Vm, op: &Op) -> Result<Step> {
    let value = vm.register(op.p1 as usize).clone();
    vm.set_register(op.p2 as usize, value);
    Ok(Step::Continue)
}

fn op_scopy(vm: &mut Vm, op: &Op) -> Result<Step> {
    op_copy(vm, op)
}

enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Compares register p3 against register p1 (the reference's
/// `reg[p3] OP reg[p1]` orientation) and jumps to p2 if true. A type
/// mismatch between the two registers is `Error::Parse` (`CHIDB_EPARSE`).
fn compare(vm: &mut Vm, op: &Op, cmp: Cmp) -> Result<Step> {
    let lhs = vm.register(op.p3 as usize).clone();
    let rhs = vm.register(op.p1 as usize).clone();
    let take = match (&lhs, &rhs) {
        (Register::Int32(a), Register::Int32(b)) => match cmp {
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
        },
        (Register::Str(a), Register::Str(b)) => match cmp {
            Cmp::Eq => a == b,
            Cmp::Ne => a != b,
            Cmp::Lt => a < b,
            Cmp::Le => a <= b,
            Cmp::Gt => a > b,
            Cmp::Ge => a >= b,
        },
        _ => return Err(Error::Parse("comparison operands have mismatched types".into())),
    };
    if take {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_eq(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Eq)
}
fn op_ne(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Ne)
}
fn op_lt(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Lt)
}
fn op_le(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Le)
}
fn op_gt(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Gt)
}
fn op_ge(vm: &mut Vm, op: &Op) -> Result<Step> {
    compare(vm, op, Cmp::Ge)
}

/// p1: cursor. p2: jump addr. p3: register holding the comparison key.
/// Compares the cursor's current index key against the register.
fn idx_compare(vm: &mut Vm, op: &Op, cmp: Cmp) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let cell = vm.cursors[idx].as_ref().unwrap().current()?;
    let idx_key = match cell {
        Cell::IndexLeaf { idx_key, .. } | Cell::IndexInternal { idx_key, .. } => idx_key,
        _ => return Err(Error::Parse("Idx* op requires an index cursor".into())),
    };
    let k = vm.register(op.p3 as usize).as_i32()?;
    let take = match cmp {
        Cmp::Gt => idx_key > k,
        Cmp::Ge => idx_key >= k,
        Cmp::Lt => idx_key < k,
        Cmp::Le => idx_key <= k,
        _ => unreachable!("idx_compare only used with Gt/Ge/Lt/Le"),
    };
    if take {
        vm.set_pc(op.p2 as usize);
    }
    Ok(Step::Continue)
}

fn op_idx_gt(vm: &mut Vm, op: &Op) -> Result<Step> {
    idx_compare(vm, op, Cmp::Gt)
}
fn op_idx_ge(vm: &mut Vm, op: &Op) -> Result<Step> {
    idx_compare(vm, op, Cmp::Ge)
}
fn op_idx_lt(vm: &mut Vm, op: &Op) -> Result<Step> {
    idx_compare(vm, op, Cmp::Lt)
}
fn op_idx_le(vm: &mut Vm, op: &Op) -> Result<Step> {
    idx_compare(vm, op, Cmp::Le)
}

/// p1: cursor. p2: destination register for the current cell's PK.
fn op_idx_pkey(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let cell = vm.cursors[idx].as_ref().unwrap().current()?;
    let pk = match cell {
        Cell::IndexLeaf { pk, .. } | Cell::IndexInternal { pk, .. } => pk,
        _ => return Err(Error::Parse("IdxPKey requires an index cursor".into())),
    };
    vm.set_register(op.p2 as usize, Register::Int32(pk));
    Ok(Step::Continue)
}

/// p1: cursor. p2: register holding the index key. p3: register holding
/// the PK.
fn op_idx_insert(vm: &mut Vm, op: &Op) -> Result<Step> {
    let idx = op.p1 as usize;
    cursor_or(vm, idx)?;
    let root = vm.cursors[idx].as_ref().unwrap().root();
    let idx_key = vm.register(op.p2 as usize).as_i32()?;
    let pk = vm.register(op.p3 as usize).as_i32()?;
    vm.bt.insert(root, Cell::IndexLeaf { idx_key, pk })?;
    Ok(Step::Continue)
}

fn op_halt(_vm: &mut Vm, op: &Op) -> Result<Step> {
    Ok(Step::Halted(op.p1))
}
