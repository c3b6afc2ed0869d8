//! Purpose: Build row predicates from typed column comparisons.
//! Exports: `Query`, `ColumnRef`, `Predicate`, `CompareOp`, `Origin`.
//! Role: Compiles `col <op> literal` comparisons, combined with `&` / `|`, into the
//!       native predicate text understood by the table scan (see `filter`).
//! Invariants: Unknown columns and incompatible literals fail at build time, before any I/O.
//! Invariants: Datetime literals are converted to the column's physical epoch integer; a literal
//!             between two ticks of the column's unit is rounded per operator (or folded to a
//!             constant for `==` / `!=`) so the predicate selects exactly the matching rows.
//! Invariants: A predicate remembers which table it was built against.
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::path::{Path, PathBuf};

use crate::core::codec::datetime_to_epoch;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::Scalar;
use crate::core::schema::{ColumnDescriptor, SemanticType, TableSchema};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::Ne => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::Le => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::Ge => ordering != Less,
        }
    }
}

/// Table a predicate was built against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    Table(PathBuf),
    /// Result of combining predicates from different tables; never executable.
    Mixed,
}

impl Origin {
    fn merge(self, other: Origin) -> Origin {
        if self == other { self } else { Origin::Mixed }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    text: String,
    origin: Origin,
}

impl Predicate {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Fails unless this predicate was built against the table at `path`.
    pub fn check_origin(&self, path: &Path) -> Result<(), Error> {
        match &self.origin {
            Origin::Table(origin) if origin == path => Ok(()),
            Origin::Table(origin) => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("predicate was built against {}", origin.display()))
                .with_path(path)),
            Origin::Mixed => Err(Error::new(ErrorKind::Usage)
                .with_message("predicate combines comparisons from different tables")
                .with_path(path)),
        }
    }

    fn combine(self, rhs: Predicate, joiner: &str) -> Predicate {
        Predicate {
            text: format!("({}) {joiner} ({})", self.text, rhs.text),
            origin: self.origin.merge(rhs.origin),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.combine(rhs, "and")
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.combine(rhs, "or")
    }
}

/// Query builder bound to one table's schema.
#[derive(Clone, Copy, Debug)]
pub struct Query<'a> {
    schema: &'a TableSchema,
    origin: &'a Path,
}

impl<'a> Query<'a> {
    pub fn new(schema: &'a TableSchema, origin: &'a Path) -> Self {
        Self { schema, origin }
    }

    pub fn col(&self, name: &str) -> Result<ColumnRef<'a>, Error> {
        let descriptor = self.schema.column(name).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("unknown column in query")
                .with_column(name)
                .with_path(self.origin)
        })?;
        Ok(ColumnRef {
            descriptor,
            origin: self.origin,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColumnRef<'a> {
    descriptor: &'a ColumnDescriptor,
    origin: &'a Path,
}

impl ColumnRef<'_> {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.descriptor.semantic_type
    }

    pub fn compare(&self, op: CompareOp, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        let text = match format_literal(self.descriptor, op, &literal.into())? {
            Literal::Value(literal) => {
                let name = serde_json::to_string(&self.descriptor.name).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to quote column name")
                        .with_source(err)
                })?;
                format!(".[{name}] {} {literal}", op.symbol())
            }
            Literal::Constant(outcome) => outcome.to_string(),
        };
        Ok(Predicate {
            text,
            origin: Origin::Table(self.origin.to_path_buf()),
        })
    }

    pub fn eq(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Eq, literal)
    }

    pub fn ne(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Ne, literal)
    }

    pub fn lt(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Lt, literal)
    }

    pub fn le(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Le, literal)
    }

    pub fn gt(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Gt, literal)
    }

    pub fn ge(&self, literal: impl Into<Scalar>) -> Result<Predicate, Error> {
        self.compare(CompareOp::Ge, literal)
    }
}

enum Literal {
    Value(String),
    /// The comparison has the same outcome for every stored value.
    Constant(bool),
}

fn format_literal(column: &ColumnDescriptor, op: CompareOp, value: &Scalar) -> Result<Literal, Error> {
    let text = match (column.semantic_type, value) {
        (SemanticType::DatetimeEpoch { unit }, Scalar::Datetime(dt)) => {
            let floor = datetime_to_epoch(*dt, unit).map_err(|err| err.with_column(&column.name))?;
            if dt.unix_timestamp_nanos().rem_euclid(unit.nanos()) == 0 {
                floor.to_string()
            } else {
                // Stored ticks t satisfy t < L exactly when t < ceil(L), and t <= L when t <= floor(L).
                match op {
                    CompareOp::Eq => return Ok(Literal::Constant(false)),
                    CompareOp::Ne => return Ok(Literal::Constant(true)),
                    CompareOp::Le | CompareOp::Gt => floor.to_string(),
                    CompareOp::Lt | CompareOp::Ge => match floor.checked_add(1) {
                        Some(ceil) => ceil.to_string(),
                        None => return Ok(Literal::Constant(op == CompareOp::Lt)),
                    },
                }
            }
        }
        (SemanticType::DatetimeEpoch { .. } | SemanticType::Int64 | SemanticType::Float64, Scalar::Int(v)) => {
            v.to_string()
        }
        (SemanticType::Int64 | SemanticType::Float64, Scalar::Float(v)) => {
            if !v.is_finite() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("cannot compare against non-finite literal {v}"))
                    .with_column(&column.name));
            }
            format!("{v:?}")
        }
        (SemanticType::Bool, Scalar::Bool(v)) => v.to_string(),
        (SemanticType::FixedString { .. }, Scalar::Str(v)) => serde_json::to_string(v).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to quote literal")
                .with_source(err)
        })?,
        (semantic_type, literal) => {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("cannot compare a {semantic_type:?} column with {literal:?}"))
                .with_column(&column.name));
        }
    };
    Ok(Literal::Value(text))
}
