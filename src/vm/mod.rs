/*
The bytecode virtual machine: register file, cursor array, and a
fetch-decode-dispatch loop. Grounded in `original_source/src/libchidb/dbm.h`'s
`chidb_stmt` (register array, cursor array, `pc`) and `dbm-ops.c`'s dispatch
table built by `FOREACH_OP`.

Cursors are stored by index in `cursors` rather than embedded in `Cursor`
itself, and every cursor-stepping call threads `&mut self.bt` through —
this is what lets a single struct own both the B-tree and its open cursors
without a self-referential borrow.
*/

pub mod opcodes;

use crate::btree::Btree;
use crate::cursor::Cursor;
use crate::error::Result;

pub use opcodes::{OpCode, P4};

#[derive(Debug, Clone, PartialEq)]
pub enum Register {
    Null,
    Int32(i32),
    Str(String),
    /// A serialized record payload, produced by `MakeRecord`. Distinct from
    /// `Str` since a record's bytes are not legal SQL text.
    Record(Vec<u8>),
}

impl Register {
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Register::Int32(v) => Ok(*v),
            _ => Err(crate::error::Error::Parse("expected an integer register".into())),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Register::Record(b) => Ok(b),
            Register::Str(s) => Ok(s.as_bytes()),
            _ => Err(crate::error::Error::Parse("expected a record/string register".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Op {
    pub opcode: OpCode,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub p4: Option<P4>,
}

impl Op {
    pub fn new(opcode: OpCode, p1: i32, p2: i32, p3: i32) -> Self {
        Op { opcode, p1, p2, p3, p4: None }
    }

    pub fn with_p4(opcode: OpCode, p1: i32, p2: i32, p3: i32, p4: P4) -> Self {
        Op { opcode, p1, p2, p3, p4: Some(p4) }
    }
}

/// Non-error control-flow results of a single `Vm::step`. Distinct from
/// `Error`: a halted or row-producing program is not a failed one.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Continue,
    Row,
    Halted(i32),
}

pub struct Vm {
    pub bt: Btree,
    program: Vec<Op>,
    pc: usize,
    registers: Vec<Register>,
    cursors: Vec<Option<Cursor>>,
    result_start: usize,
    result_count: usize,
}

impl Vm {
    pub fn new(bt: Btree, program: Vec<Op>, n_registers: usize, n_cursors: usize) -> Self {
        Vm {
            bt,
            program,
            pc: 0,
            registers: vec![Register::Null; n_registers],
            cursors: (0..n_cursors).map(|_| None).collect(),
            result_start: 0,
            result_count: 0,
        }
    }

    pub fn register(&self, i: usize) -> &Register {
        &self.registers[i]
    }

    pub fn set_register(&mut self, i: usize, value: Register) {
        self.registers[i] = value;
    }

    pub fn cursor_mut(&mut self, i: usize) -> Option<&mut Cursor> {
        self.cursors[i].as_mut()
    }

    pub fn current_row(&self) -> &[Register] {
        &self.registers[self.result_start..self.result_start + self.result_count]
    }

    /// Executes one instruction. The default outcome is to fall through to
    /// the next instruction (`pc + 1`, set before dispatch so a handler can
    /// overwrite it with a jump target), matching the reference's
    /// `stmt->pc = op->p2` convention for conditional jumps.
    pub fn step(&mut self) -> Result<Step> {
        if self.pc >= self.program.len() {
            return Ok(Step::Halted(0));
        }
        let op = self.program[self.pc].clone();
        self.pc += 1;
        opcodes::dispatch(self, &op)
    }

    pub fn run(&mut self) -> Result<Vec<Vec<Register>>> {
        let mut rows = Vec::new();
        loop {
            match self.step()? {
                Step::Continue => continue,
                Step::Row => rows.push(self.current_row().to_vec()),
                Step::Halted(_) => return Ok(rows),
            }
        }
    }

    pub(crate) fn set_result_row(&mut self, start: usize, count: usize) {
        self.result_start = start;
        self.result_count = count;
    }

    pub(crate) fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub(crate) fn open_cursor(&mut self, idx: usize, root: crate::pager::PageNum) {
        self.cursors[idx] = Some(Cursor::new(root));
    }

    pub(crate) fn close_cursor(&mut self, idx: usize) {
        self.cursors[idx] = None;
    }
}
