//! Purpose: Compile and evaluate native row predicates inside table scans.
//! Exports: `RowFilter`, `RowValue`, `row_object`.
//! Role: The storage engine's filter language is a jq boolean expression evaluated by
//!       `jaq-core` against each row's physical values (`{"col": value, ...}`).
//! Invariants: Parse/compile failures are usage errors; runtime eval errors count as "no match".
//! Invariants: Each predicate must yield only booleans (otherwise: usage error).
//! Invariants: Integers stay exact i64 values; epoch timestamps never round through f64.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, Error as JaqError, Native, RcIter};

use crate::core::codec::Physical;
use crate::core::error::{Error, ErrorKind};
use crate::core::schema::TableSchema;

#[derive(Clone)]
pub struct RowFilter {
    expr: String,
    filter: jaq_core::Filter<Native<RowValue>>,
}

impl fmt::Debug for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowFilter").field("expr", &self.expr).finish()
    }
}

impl RowFilter {
    pub fn compile(expr: &str) -> Result<Self, Error> {
        let arena = Arena::default();
        let loader = Loader::new(std::iter::empty());

        let program = File {
            code: expr,
            path: (),
        };
        let modules = loader
            .load(&arena, program)
            .map_err(|errs| compile_error(expr, errs))?;

        let filter = Compiler::default()
            .with_funs(jaq_std::base_funs::<RowValue>())
            .compile(modules)
            .map_err(|errs| compile_error(expr, errs))?;

        Ok(Self {
            expr: expr.to_string(),
            filter,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn matches(&self, row: RowValue) -> Result<bool, Error> {
        let inputs = RcIter::new(core::iter::empty::<Result<RowValue, String>>());
        let out = self.filter.run((Ctx::new([], &inputs), row));

        let mut any_true = false;
        for item in out {
            match item {
                Ok(RowValue::Bool(true)) => any_true = true,
                Ok(RowValue::Bool(false)) => {}
                Ok(other) => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("predicate must yield booleans")
                        .with_hint(format!(
                            "Predicate `{}` yielded non-boolean value: {other}",
                            self.expr
                        )));
                }
                // Missing fields and type mismatches evaluate to false.
                Err(_) => return Ok(false),
            }
        }

        Ok(any_true)
    }
}

fn compile_error<E: fmt::Debug>(expr: &str, err: E) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message("invalid predicate")
        .with_hint(format!(
            "Failed to parse/compile `{expr}`.\nDetails: {err:?}\nExample: .[\"symbol\"] == \"AAPL\""
        ))
}

/// Builds the object a predicate sees for one row.
pub fn row_object(schema: &TableSchema, cells: &[Physical<'_>]) -> RowValue {
    let map = schema
        .columns()
        .iter()
        .zip(cells)
        .map(|(descriptor, cell)| (descriptor.name.clone(), RowValue::from_physical(cell)))
        .collect();
    RowValue::Obj(map)
}

#[derive(Clone, Debug)]
pub enum RowValue {
    Null,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    Arr(Vec<RowValue>),
    Obj(BTreeMap<String, RowValue>),
}

impl RowValue {
    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Num(_) => 2,
            Self::Str(_) => 3,
            Self::Arr(_) => 4,
            Self::Obj(_) => 5,
        }
    }

    fn as_f64_opt(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    fn as_str_opt(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn as_isize_exact(&self) -> Option<isize> {
        match self {
            Self::Int(n) => isize::try_from(*n).ok(),
            Self::Num(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as isize),
            _ => None,
        }
    }

    fn from_physical(cell: &Physical<'_>) -> Self {
        match cell {
            Physical::Int(v) => Self::Int(*v),
            Physical::Float(v) => Self::Num(*v),
            Physical::Bool(v) => Self::Bool(*v),
            Physical::Str(v) => Self::Str((*v).to_string()),
        }
    }

    /// IEEE comparison: `-0.0 == 0.0`, and NaN is unordered against everything.
    fn num_partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Num(a), Self::Num(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Num(b)) => (*a as f64).partial_cmp(b),
            (Self::Num(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    // Total order for sorting: IEEE where defined, NaN placed by its sign bit.
    fn num_cmp(&self, other: &Self) -> Ordering {
        if let Some(ordering) = self.num_partial_cmp(other) {
            return ordering;
        }
        match (self.as_f64_opt(), other.as_f64_opt()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => Ordering::Equal,
        }
    }

    fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Num(_))
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => match serde_json::to_string(s) {
                Ok(encoded) => write!(f, "{encoded}"),
                Err(_) => write!(f, "\"<invalid string>\""),
            },
            Self::Arr(a) => {
                write!(f, "[")?;
                for (idx, item) in a.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Obj(o) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in o.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    let k = serde_json::to_string(k).unwrap_or_else(|_| "\"<key>\"".to_string());
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for RowValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<isize> for RowValue {
    fn from(value: isize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for RowValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<String> for RowValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl FromIterator<Self> for RowValue {
    fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
        Self::Arr(iter.into_iter().collect())
    }
}

// Predicate operators go through these two impls, so numbers follow IEEE rules here;
// `Ord` stays total for `sort` and friends.
impl PartialEq for RowValue {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl Eq for RowValue {}

impl PartialOrd for RowValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_number() && other.is_number() {
            return self.num_partial_cmp(other);
        }
        Some(self.cmp(other))
    }
}

impl Ord for RowValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let ka = self.kind_rank();
        let kb = other.kind_rank();
        if ka != kb {
            return ka.cmp(&kb);
        }
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Arr(a), Self::Arr(b)) => a.cmp(b),
            (Self::Obj(a), Self::Obj(b)) => a.cmp(b),
            (a, b) => a.num_cmp(b),
        }
    }
}

impl std::ops::Add for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn add(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_add(b)
                .map_or(Self::Num(a as f64 + b as f64), Self::Int)),
            (Self::Str(a), Self::Str(b)) => Ok(Self::Str(format!("{a}{b}"))),
            (Self::Arr(mut a), Self::Arr(b)) => {
                a.extend(b);
                Ok(Self::Arr(a))
            }
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a + b)),
                _ => Err(JaqError::math(l, Math::Add, r)),
            },
        }
    }
}

impl std::ops::Sub for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn sub(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_sub(b)
                .map_or(Self::Num(a as f64 - b as f64), Self::Int)),
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a - b)),
                _ => Err(JaqError::math(l, Math::Sub, r)),
            },
        }
    }
}

impl std::ops::Mul for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn mul(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Ok(a
                .checked_mul(b)
                .map_or(Self::Num(a as f64 * b as f64), Self::Int)),
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a * b)),
                _ => Err(JaqError::math(l, Math::Mul, r)),
            },
        }
    }
}

impl std::ops::Div for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn div(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self.as_f64_opt(), rhs.as_f64_opt()) {
            (Some(a), Some(b)) => Ok(Self::Num(a / b)),
            _ => Err(JaqError::math(self, Math::Div, rhs)),
        }
    }
}

impl std::ops::Rem for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn rem(self, rhs: Self) -> Self::Output {
        use jaq_core::ops::Math;
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => match a.checked_rem(b) {
                Some(r) => Ok(Self::Int(r)),
                None => Err(JaqError::math(Self::Int(a), Math::Rem, Self::Int(b))),
            },
            (l, r) => match (l.as_f64_opt(), r.as_f64_opt()) {
                (Some(a), Some(b)) => Ok(Self::Num(a % b)),
                _ => Err(JaqError::math(l, Math::Rem, r)),
            },
        }
    }
}

impl std::ops::Neg for RowValue {
    type Output = Result<Self, JaqError<Self>>;

    fn neg(self) -> Self::Output {
        match self {
            Self::Int(a) => Ok(a.checked_neg().map_or(Self::Num(-(a as f64)), Self::Int)),
            Self::Num(a) => Ok(Self::Num(-a)),
            other => Err(JaqError::typ(other, "number")),
        }
    }
}

impl jaq_core::ValT for RowValue {
    fn from_num(n: &str) -> Result<Self, JaqError<Self>> {
        if let Ok(int) = n.parse::<i64>() {
            return Ok(Self::Int(int));
        }
        let parsed = n.parse::<f64>().map_err(JaqError::str)?;
        Ok(Self::Num(parsed))
    }

    fn from_map<I: IntoIterator<Item = (Self, Self)>>(iter: I) -> Result<Self, JaqError<Self>> {
        let mut map = BTreeMap::new();
        for (k, v) in iter {
            let Some(key) = k.as_str_opt() else {
                return Err(JaqError::typ(k, "string"));
            };
            map.insert(key.to_string(), v);
        }
        Ok(Self::Obj(map))
    }

    fn values(self) -> Box<dyn Iterator<Item = Result<Self, JaqError<Self>>>> {
        match self {
            Self::Arr(values) => Box::new(values.into_iter().map(Ok)),
            Self::Obj(values) => Box::new(values.into_values().map(Ok)),
            other => Box::new(std::iter::once(Err(JaqError::typ(other, "iterable")))),
        }
    }

    fn index(self, index: &Self) -> Result<Self, JaqError<Self>> {
        match (self, index) {
            (Self::Obj(mut obj), Self::Str(key)) => obj
                .remove(key)
                .ok_or_else(|| JaqError::index(Self::Obj(obj), Self::Str(key.clone()))),
            (Self::Arr(arr), idx @ (Self::Int(_) | Self::Num(_))) => {
                let Some(idx_val) = idx.as_isize_exact() else {
                    return Err(JaqError::typ(idx.clone(), "integer"));
                };
                let len = arr.len() as isize;
                let pos = if idx_val < 0 { len + idx_val } else { idx_val };
                let pos = usize::try_from(pos).map_err(JaqError::str)?;
                arr.get(pos)
                    .cloned()
                    .ok_or_else(|| JaqError::index(Self::Arr(arr), idx.clone()))
            }
            (l, r) => Err(JaqError::index(l, r.clone())),
        }
    }

    fn range(self, range: jaq_core::val::Range<&Self>) -> Result<Self, JaqError<Self>> {
        let to_index = |v: &Self| -> Result<isize, JaqError<Self>> {
            v.as_isize_exact()
                .ok_or_else(|| JaqError::typ(v.clone(), "integer"))
        };
        match self {
            Self::Arr(arr) => {
                let len = arr.len() as isize;
                let start = range.start.map(to_index).transpose()?.unwrap_or(0);
                let end = range.end.map(to_index).transpose()?.unwrap_or(len);
                let norm = |idx: isize| if idx < 0 { len + idx } else { idx };
                let start = norm(start).clamp(0, len) as usize;
                let end = norm(end).clamp(0, len) as usize;
                let slice = if end >= start {
                    arr[start..end].to_vec()
                } else {
                    Vec::new()
                };
                Ok(Self::Arr(slice))
            }
            other => Err(JaqError::typ(other, "array")),
        }
    }

    fn map_values<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Arr(values) => {
                let mut out = Vec::with_capacity(values.len());
                for value in values {
                    let mut iter = f(value);
                    match iter.next() {
                        Some(Ok(v)) => out.push(v),
                        Some(Err(e)) => return Err(e),
                        None => out.push(Self::Null),
                    }
                }
                Ok(Self::Arr(out))
            }
            Self::Obj(values) => {
                let mut out = BTreeMap::new();
                for (k, v) in values {
                    let mut iter = f(v);
                    match iter.next() {
                        Some(Ok(v)) => {
                            out.insert(k, v);
                        }
                        Some(Err(e)) => return Err(e),
                        None => {
                            out.insert(k, Self::Null);
                        }
                    }
                }
                Ok(Self::Obj(out))
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::typ(other, "iterable").into()),
            },
        }
    }

    fn map_index<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        index: &Self,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Obj(mut obj) => {
                let Some(key) = index.as_str_opt() else {
                    return Err(JaqError::typ(index.clone(), "string").into());
                };
                match obj.remove(key) {
                    Some(value) => {
                        let mut iter = f(value);
                        let next = match iter.next() {
                            Some(Ok(v)) => v,
                            Some(Err(e)) => return Err(e),
                            None => Self::Null,
                        };
                        obj.insert(key.to_string(), next);
                        Ok(Self::Obj(obj))
                    }
                    None => match opt {
                        jaq_core::path::Opt::Optional => Ok(Self::Obj(obj)),
                        jaq_core::path::Opt::Essential => {
                            Err(JaqError::index(Self::Obj(obj), index.clone()).into())
                        }
                    },
                }
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::index(other, index.clone()).into()),
            },
        }
    }

    fn map_range<'a, I: Iterator<Item = jaq_core::ValX<'a, Self>>>(
        self,
        range: jaq_core::val::Range<&Self>,
        opt: jaq_core::path::Opt,
        f: impl Fn(Self) -> I,
    ) -> jaq_core::ValX<'a, Self> {
        match self {
            Self::Arr(arr) => {
                let slice = Self::Arr(arr).range(range)?;
                let mut iter = f(slice);
                match iter.next() {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(e)) => Err(e),
                    None => Ok(Self::Null),
                }
            }
            other => match opt {
                jaq_core::path::Opt::Optional => Ok(other),
                jaq_core::path::Opt::Essential => Err(JaqError::typ(other, "array").into()),
            },
        }
    }

    fn as_bool(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    fn as_str(&self) -> Option<&str> {
        self.as_str_opt()
    }
}

impl jaq_std::ValT for RowValue {
    fn into_seq<S: FromIterator<Self>>(self) -> Result<S, Self> {
        match self {
            Self::Arr(values) => Ok(values.into_iter().collect()),
            other => Err(other),
        }
    }

    fn as_isize(&self) -> Option<isize> {
        self.as_isize_exact()
    }

    fn as_f64(&self) -> Result<f64, JaqError<Self>> {
        self.as_f64_opt()
            .ok_or_else(|| JaqError::typ(self.clone(), "number"))
    }
}
