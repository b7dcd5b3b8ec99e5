//! Operation traces.
//!
//! A trace is the ordered list of low-level operations recovered for one
//! function. It arrives as loosely-typed [`TraceRecord`]s (the wire format)
//! and is validated into typed [`Operation`]s by [`Trace::ingest`]. The
//! position of an operation in the trace doubles as its timestamp.
//!
//! ## Wire format
//!
//! ```json
//! [
//!   { "address": 16, "kind": "literal", "value": 127, "width": 1,
//!     "dst": { "storage": "R0" } },
//!   { "address": 18, "kind": "load", "operands": [ { "storage": "R0" } ],
//!     "offset": 0, "width": 1 },
//!   { "address": 20, "kind": "compare", "cmp": "ne",
//!     "operands": [ { "result": 1 }, { "literal": { "value": 0, "width": 1 } } ] }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Operand of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// Named storage (register, SSA identifier, stack slot).
    Storage(String),
    /// Literal constant.
    Literal { value: i64, width: u8 },
    /// Fixed address.
    Address(u64),
    /// Result of an earlier operation, by trace position.
    Result(usize),
}

impl Operand {
    /// Creates a storage operand.
    pub fn storage(name: impl Into<String>) -> Self {
        Self::Storage(name.into())
    }

    /// Creates a literal operand.
    pub fn literal(value: i64, width: u8) -> Self {
        Self::Literal { value, width }
    }

    /// Creates a fixed-address operand.
    pub fn address(addr: u64) -> Self {
        Self::Address(addr)
    }

    /// Returns true if this is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Storage(name) => write!(f, "{}", name),
            Operand::Literal { value, .. } => {
                if *value < 0 {
                    write!(f, "-{:#x}", value.unsigned_abs())
                } else {
                    write!(f, "{:#x}", value)
                }
            }
            Operand::Address(addr) => write!(f, "@{:#x}", addr),
            Operand::Result(pos) => write!(f, "%{}", pos),
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    /// Signed less-than.
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned less-than.
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl CompareOp {
    /// Returns the signedness implied by the operator, if any.
    pub fn signedness(&self) -> Option<bool> {
        match self {
            CompareOp::Eq | CompareOp::Ne => None,
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => Some(true),
            CompareOp::Ult | CompareOp::Ule | CompareOp::Ugt | CompareOp::Uge => Some(false),
        }
    }

    /// Returns the operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt | CompareOp::Ult => "<",
            CompareOp::Le | CompareOp::Ule => "<=",
            CompareOp::Gt | CompareOp::Ugt => ">",
            CompareOp::Ge | CompareOp::Uge => ">=",
        }
    }
}

/// Bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

impl BitwiseOp {
    /// Returns the operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            BitwiseOp::And => "&",
            BitwiseOp::Or => "|",
            BitwiseOp::Xor => "^",
        }
    }
}

/// Pointer arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
}

/// A validated operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Materializes a literal.
    Literal { value: i64, width: u8 },
    /// Copies a value.
    Copy { src: Operand },
    /// Reads `width` bytes at `base + offset`.
    Load { base: Operand, offset: i64, width: u8 },
    /// Writes `value` (`width` bytes) to `base + offset`.
    Store {
        base: Operand,
        offset: i64,
        width: u8,
        value: Operand,
    },
    /// Reads `width` bytes at `base + offset + index * stride`.
    Index {
        base: Operand,
        index: Operand,
        offset: i64,
        stride: u32,
        width: u8,
    },
    /// `operand ± step`.
    PointerArith {
        op: ArithOp,
        operand: Operand,
        step: i64,
        width: u8,
    },
    /// Compares two values, producing a boolean.
    Compare {
        op: CompareOp,
        lhs: Operand,
        rhs: Operand,
    },
    /// Bitwise combination of two values.
    Bitwise {
        op: BitwiseOp,
        lhs: Operand,
        rhs: Operand,
        width: u8,
    },
    /// Calls through `target`.
    Call {
        target: Operand,
        args: Vec<Operand>,
        result_used: bool,
    },
}

impl OpKind {
    /// Returns true if the operation produces a value.
    pub fn has_result(&self) -> bool {
        !matches!(self, OpKind::Store { .. })
    }

    /// Returns the operands read by the operation.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            OpKind::Literal { .. } => Vec::new(),
            OpKind::Copy { src } => vec![src],
            OpKind::Load { base, .. } => vec![base],
            OpKind::Store { base, value, .. } => vec![base, value],
            OpKind::Index { base, index, .. } => vec![base, index],
            OpKind::PointerArith { operand, .. } => vec![operand],
            OpKind::Compare { lhs, rhs, .. } | OpKind::Bitwise { lhs, rhs, .. } => vec![lhs, rhs],
            OpKind::Call { target, args, .. } => {
                let mut ops = vec![target];
                ops.extend(args.iter());
                ops
            }
        }
    }
}

/// An operation at a given trace position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Position in the trace (timestamp).
    pub position: usize,
    /// Address of the originating instruction.
    pub address: u64,
    /// What the operation does.
    pub kind: OpKind,
    /// Storage receiving the result, if any.
    pub dst: Option<String>,
}

fn fmt_offset(f: &mut fmt::Formatter<'_>, offset: i64) -> fmt::Result {
    match offset {
        0 => Ok(()),
        o if o < 0 => write!(f, " - {:#x}", o.unsigned_abs()),
        o => write!(f, " + {:#x}", o),
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::Literal { value, width } => {
                write!(f, "{}", Operand::literal(*value, *width))
            }
            OpKind::Copy { src } => write!(f, "{}", src),
            OpKind::Load {
                base,
                offset,
                width,
            } => {
                write!(f, "Mem[{}", base)?;
                fmt_offset(f, *offset)?;
                write!(f, "]:{}", width)
            }
            OpKind::Store {
                base,
                offset,
                width,
                value,
            } => {
                write!(f, "Mem[{}", base)?;
                fmt_offset(f, *offset)?;
                write!(f, "]:{} = {}", width, value)
            }
            OpKind::Index {
                base,
                index,
                offset,
                stride,
                width,
            } => {
                write!(f, "Mem[{} + {} * {}", base, index, stride)?;
                fmt_offset(f, *offset)?;
                write!(f, "]:{}", width)
            }
            OpKind::PointerArith {
                op, operand, step, ..
            } => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                };
                write!(f, "{} {} {:#x}", operand, sym, step)
            }
            OpKind::Compare { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            OpKind::Bitwise { op, lhs, rhs, .. } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            OpKind::Call { target, args, .. } => {
                write!(f, "{}(", target)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Kind tag of a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Literal,
    Copy,
    Load,
    Store,
    Index,
    Add,
    Sub,
    Compare,
    Bitwise,
    Call,
}

/// Unvalidated operation record as produced by the trace recovery stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceRecord {
    pub address: u64,
    pub kind: Option<RecordKind>,
    pub operands: Vec<Operand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stride: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmp: Option<CompareOp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit: Option<BitwiseOp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg_count: Option<i64>,
    pub result_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<Operand>,
}

impl TraceRecord {
    /// Creates a record of the given kind.
    pub fn new(address: u64, kind: RecordKind) -> Self {
        Self {
            address,
            kind: Some(kind),
            ..Self::default()
        }
    }
}

/// Validates records one at a time, tracking which positions have results.
struct Ingestor {
    has_result: Vec<bool>,
}

impl Ingestor {
    fn operation(&mut self, position: usize, record: TraceRecord) -> Result<Operation> {
        let kind = record.kind.ok_or(Error::MissingField {
            position,
            field: "kind",
        })?;

        for operand in &record.operands {
            self.check_operand(position, operand)?;
        }

        let require_width = |width: Option<u8>| -> Result<u8> {
            match width {
                None => Err(Error::MissingField {
                    position,
                    field: "width",
                }),
                Some(0) => Err(Error::InvalidField {
                    position,
                    field: "width",
                    reason: "must be non-zero".to_string(),
                }),
                Some(w) => Ok(w),
            }
        };

        let arity = |expected: usize| -> Result<()> {
            if record.operands.len() == expected {
                Ok(())
            } else {
                Err(Error::InvalidField {
                    position,
                    field: "operands",
                    reason: format!(
                        "expected {} operand(s), found {}",
                        expected,
                        record.operands.len()
                    ),
                })
            }
        };

        let op_kind = match kind {
            RecordKind::Literal => {
                arity(0)?;
                let value = record.value.ok_or(Error::MissingField {
                    position,
                    field: "value",
                })?;
                OpKind::Literal {
                    value,
                    width: require_width(record.width)?,
                }
            }
            RecordKind::Copy => {
                arity(1)?;
                OpKind::Copy {
                    src: record.operands[0].clone(),
                }
            }
            RecordKind::Load => {
                arity(1)?;
                OpKind::Load {
                    base: record.operands[0].clone(),
                    offset: record.offset.unwrap_or(0),
                    width: require_width(record.width)?,
                }
            }
            RecordKind::Store => {
                arity(2)?;
                OpKind::Store {
                    base: record.operands[0].clone(),
                    offset: record.offset.unwrap_or(0),
                    width: require_width(record.width)?,
                    value: record.operands[1].clone(),
                }
            }
            RecordKind::Index => {
                arity(2)?;
                let stride = match record.stride {
                    None => {
                        return Err(Error::MissingField {
                            position,
                            field: "stride",
                        })
                    }
                    Some(0) => {
                        return Err(Error::InvalidField {
                            position,
                            field: "stride",
                            reason: "must be non-zero".to_string(),
                        })
                    }
                    Some(s) => s,
                };
                OpKind::Index {
                    base: record.operands[0].clone(),
                    index: record.operands[1].clone(),
                    offset: record.offset.unwrap_or(0),
                    stride,
                    width: require_width(record.width)?,
                }
            }
            RecordKind::Add | RecordKind::Sub => {
                arity(1)?;
                let step = record.step.ok_or(Error::MissingField {
                    position,
                    field: "step",
                })?;
                OpKind::PointerArith {
                    op: if kind == RecordKind::Add {
                        ArithOp::Add
                    } else {
                        ArithOp::Sub
                    },
                    operand: record.operands[0].clone(),
                    step,
                    width: require_width(record.width)?,
                }
            }
            RecordKind::Compare => {
                arity(2)?;
                let op = record.cmp.ok_or(Error::MissingField {
                    position,
                    field: "cmp",
                })?;
                OpKind::Compare {
                    op,
                    lhs: record.operands[0].clone(),
                    rhs: record.operands[1].clone(),
                }
            }
            RecordKind::Bitwise => {
                arity(2)?;
                let op = record.bit.ok_or(Error::MissingField {
                    position,
                    field: "bit",
                })?;
                OpKind::Bitwise {
                    op,
                    lhs: record.operands[0].clone(),
                    rhs: record.operands[1].clone(),
                    width: require_width(record.width)?,
                }
            }
            RecordKind::Call => {
                let count = record.arg_count.ok_or(Error::MissingField {
                    position,
                    field: "arg_count",
                })?;
                if count < 0 {
                    return Err(Error::InvalidField {
                        position,
                        field: "arg_count",
                        reason: format!("negative argument count {}", count),
                    });
                }
                arity(count as usize + 1)?;
                let mut operands = record.operands.iter().cloned();
                let target = operands.next().ok_or(Error::MissingField {
                    position,
                    field: "operands",
                })?;
                OpKind::Call {
                    target,
                    args: operands.collect(),
                    result_used: record.result_used,
                }
            }
        };

        let dst = match record.dst {
            None => None,
            Some(_) if !op_kind.has_result() => {
                return Err(Error::InvalidField {
                    position,
                    field: "dst",
                    reason: "operation produces no result".to_string(),
                })
            }
            Some(Operand::Storage(name)) => Some(name),
            Some(other) => {
                return Err(Error::InvalidField {
                    position,
                    field: "dst",
                    reason: format!("`{}` is not a storage location", other),
                })
            }
        };

        self.has_result.push(op_kind.has_result());
        Ok(Operation {
            position,
            address: record.address,
            kind: op_kind,
            dst,
        })
    }

    fn check_operand(&self, position: usize, operand: &Operand) -> Result<()> {
        match operand {
            Operand::Result(target) if !self.has_result.get(*target).copied().unwrap_or(false) => {
                Err(Error::UnknownOperand {
                    position,
                    target: *target,
                })
            }
            Operand::Literal { width: 0, .. } => Err(Error::InvalidField {
                position,
                field: "operands",
                reason: "literal width must be non-zero".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// A validated operation trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    operations: Vec<Operation>,
}

impl Trace {
    /// Validates wire records into a trace.
    ///
    /// Fails on the first malformed record; nothing is retried.
    pub fn ingest(records: impl IntoIterator<Item = TraceRecord>) -> Result<Self> {
        let mut ingestor = Ingestor {
            has_result: Vec::new(),
        };
        let operations = records
            .into_iter()
            .enumerate()
            .map(|(position, record)| ingestor.operation(position, record))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { operations })
    }

    /// Parses and validates a JSON array of records.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<TraceRecord> = serde_json::from_str(json)?;
        Self::ingest(records)
    }

    /// Returns the operations in trace order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the operation at a position.
    pub fn get(&self, position: usize) -> Option<&Operation> {
        self.operations.get(position)
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the trace is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Incremental construction of wire records.
///
/// Every method appends one record and returns an operand referring to its
/// result, so traces read like the code they describe:
///
/// ```
/// use tyrecon_core::{Operand, TraceBuilder};
///
/// let mut b = TraceBuilder::new();
/// let byte = b.load(Operand::storage("R0"), 0, 1);
/// b.assign("A");
/// b.compare_ne(byte, Operand::literal(0, 1));
/// let trace = b.build().unwrap();
/// assert_eq!(trace.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    records: Vec<TraceRecord>,
    next_address: u64,
}

impl TraceBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address of the next record.
    pub fn at(&mut self, address: u64) -> &mut Self {
        self.next_address = address;
        self
    }

    /// Appends a raw record.
    pub fn push(&mut self, mut record: TraceRecord) -> Operand {
        if record.address == 0 {
            record.address = self.next_address;
        }
        self.next_address = record.address + 1;
        self.records.push(record);
        Operand::Result(self.records.len() - 1)
    }

    /// Routes the result of the last record into named storage.
    pub fn assign(&mut self, dst: &str) -> Operand {
        if let Some(last) = self.records.last_mut() {
            last.dst = Some(Operand::storage(dst));
        }
        Operand::storage(dst)
    }

    fn record(&self, kind: RecordKind) -> TraceRecord {
        TraceRecord::new(self.next_address, kind)
    }

    /// Appends a literal.
    pub fn literal(&mut self, value: i64, width: u8) -> Operand {
        let mut r = self.record(RecordKind::Literal);
        r.value = Some(value);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends a copy.
    pub fn copy(&mut self, src: Operand) -> Operand {
        let mut r = self.record(RecordKind::Copy);
        r.operands = vec![src];
        self.push(r)
    }

    /// Appends a load.
    pub fn load(&mut self, base: Operand, offset: i64, width: u8) -> Operand {
        let mut r = self.record(RecordKind::Load);
        r.operands = vec![base];
        r.offset = Some(offset);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends a store.
    pub fn store(&mut self, base: Operand, offset: i64, width: u8, value: Operand) {
        let mut r = self.record(RecordKind::Store);
        r.operands = vec![base, value];
        r.offset = Some(offset);
        r.width = Some(width);
        self.push(r);
    }

    /// Appends an indexed load.
    pub fn index(
        &mut self,
        base: Operand,
        index: Operand,
        offset: i64,
        stride: u32,
        width: u8,
    ) -> Operand {
        let mut r = self.record(RecordKind::Index);
        r.operands = vec![base, index];
        r.offset = Some(offset);
        r.stride = Some(stride);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends `operand + step`.
    pub fn add(&mut self, operand: Operand, step: i64, width: u8) -> Operand {
        let mut r = self.record(RecordKind::Add);
        r.operands = vec![operand];
        r.step = Some(step);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends `operand - step`.
    pub fn sub(&mut self, operand: Operand, step: i64, width: u8) -> Operand {
        let mut r = self.record(RecordKind::Sub);
        r.operands = vec![operand];
        r.step = Some(step);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends a comparison.
    pub fn compare(&mut self, op: CompareOp, lhs: Operand, rhs: Operand) -> Operand {
        let mut r = self.record(RecordKind::Compare);
        r.operands = vec![lhs, rhs];
        r.cmp = Some(op);
        self.push(r)
    }

    /// Appends `lhs != rhs`.
    pub fn compare_ne(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.compare(CompareOp::Ne, lhs, rhs)
    }

    /// Appends a bitwise operation.
    pub fn bitwise(&mut self, op: BitwiseOp, lhs: Operand, rhs: Operand, width: u8) -> Operand {
        let mut r = self.record(RecordKind::Bitwise);
        r.operands = vec![lhs, rhs];
        r.bit = Some(op);
        r.width = Some(width);
        self.push(r)
    }

    /// Appends a call.
    pub fn call(&mut self, target: Operand, args: Vec<Operand>, result_used: bool) -> Operand {
        let mut r = self.record(RecordKind::Call);
        r.arg_count = Some(args.len() as i64);
        r.operands = std::iter::once(target).chain(args).collect();
        r.result_used = result_used;
        self.push(r)
    }

    /// Returns the records built so far.
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Validates the records into a trace.
    pub fn build(self) -> Result<Trace> {
        Trace::ingest(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_from_json() {
        let json = r#"[
            {"address": 16, "kind": "literal", "value": 127, "width": 1, "dst": {"storage": "R0"}},
            {"address": 18, "kind": "load", "operands": [{"storage": "R0"}], "width": 1},
            {"address": 20, "kind": "compare", "cmp": "ne",
             "operands": [{"result": 1}, {"literal": {"value": 0, "width": 1}}]}
        ]"#;
        let trace = Trace::from_json(json).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.operations()[0].dst.as_deref(), Some("R0"));
        assert!(matches!(
            trace.operations()[1].kind,
            OpKind::Load { offset: 0, width: 1, .. }
        ));
        assert_eq!(trace.operations()[2].to_string(), "%1 != 0x0");
    }

    #[test]
    fn test_negative_arg_count_rejected() {
        let mut record = TraceRecord::new(0, RecordKind::Call);
        record.operands = vec![Operand::address(0x30)];
        record.arg_count = Some(-1);
        let err = Trace::ingest([record]).unwrap_err();
        match err {
            Error::InvalidField {
                position, field, ..
            } => {
                assert_eq!(position, 0);
                assert_eq!(field, "arg_count");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_arg_count_mismatch_rejected() {
        let mut record = TraceRecord::new(0, RecordKind::Call);
        record.operands = vec![Operand::address(0x30), Operand::storage("R1")];
        record.arg_count = Some(0);
        let err = Trace::ingest([record]).unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "operands", .. }));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut b = TraceBuilder::new();
        b.copy(Operand::Result(3));
        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownOperand {
                position: 0,
                target: 3
            }
        ));
    }

    #[test]
    fn test_store_has_no_result() {
        let mut b = TraceBuilder::new();
        b.store(Operand::storage("R0"), 0, 1, Operand::literal(1, 1));
        b.copy(Operand::Result(0));
        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownOperand {
                position: 1,
                target: 0
            }
        ));
    }

    #[test]
    fn test_missing_fields_identified() {
        let record = TraceRecord::default();
        assert!(matches!(
            Trace::ingest([record]).unwrap_err(),
            Error::MissingField { field: "kind", .. }
        ));

        let mut record = TraceRecord::new(0, RecordKind::Load);
        record.operands = vec![Operand::storage("R0")];
        assert!(matches!(
            Trace::ingest([record]).unwrap_err(),
            Error::MissingField { field: "width", .. }
        ));
    }

    #[test]
    fn test_dst_must_be_storage() {
        let mut record = TraceRecord::new(0, RecordKind::Literal);
        record.value = Some(1);
        record.width = Some(1);
        record.dst = Some(Operand::address(0x10));
        assert!(matches!(
            Trace::ingest([record]).unwrap_err(),
            Error::InvalidField { field: "dst", .. }
        ));
    }

    #[test]
    fn test_operation_display() {
        let mut b = TraceBuilder::new();
        let p = b.load(Operand::storage("R1"), 4, 2);
        b.sub(Operand::storage("R0"), 1, 1);
        b.index(Operand::address(0x20), p, -2, 4, 4);
        b.call(Operand::address(0x3), vec![Operand::storage("R7")], false);
        let trace = b.build().unwrap();
        let text: Vec<_> = trace.operations().iter().map(|o| o.to_string()).collect();
        assert_eq!(
            text,
            [
                "Mem[R1 + 0x4]:2",
                "R0 - 0x1",
                "Mem[@0x20 + %0 * 4 - 0x2]:4",
                "@0x3(R7)",
            ]
        );
    }

    #[test]
    fn test_builder_assigns_addresses() {
        let mut b = TraceBuilder::new();
        b.at(0x100);
        b.literal(1, 1);
        b.literal(2, 1);
        let records = b.records();
        assert_eq!(records[0].address, 0x100);
        assert_eq!(records[1].address, 0x101);
    }
}
