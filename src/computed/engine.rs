//! Expression engine abstraction
//!
//! Computed attributes run against a minimal prepare/bind/step/reset
//! surface so any embeddable evaluator can back them. The default backend
//! is an in-memory SQLite database, opened lazily by the data source and
//! shared by every computed attribute of every layer.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use super::errors::{ComputedError, ComputedResult};

/// Opaque handle to a prepared expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprHandle(usize);

/// A value bound to one positional parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindValue<'a> {
    Null,
    Integer(i32),
    Integer64(i64),
    Real(f64),
    Text(&'a str),
}

/// A single-column result value, dispatched by its native type
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Minimal embeddable expression evaluator
///
/// Positions are zero-based. `step` yields `None` when the expression
/// produces no row or more than one result column; `reset` clears bound
/// state so the prepared expression can be reused without recompilation.
pub trait ExpressionEngine {
    fn prepare(&mut self, expr: &str) -> ComputedResult<ExprHandle>;

    fn bind(&mut self, handle: ExprHandle, position: usize, value: BindValue<'_>)
        -> ComputedResult<()>;

    fn step(&mut self, handle: ExprHandle) -> ComputedResult<Option<OutputValue>>;

    fn reset(&mut self, handle: ExprHandle);
}

struct PreparedExpr {
    sql: String,
    binds: Vec<SqlValue>,
}

/// SQLite-backed expression engine
///
/// Compilation is validated at prepare time; afterwards the connection's
/// prepared-statement cache keeps the compiled program alive, so stepping
/// does not recompile. Bound parameters are buffered per handle and applied
/// at execution.
pub struct SqliteEngine {
    conn: Connection,
    exprs: Vec<PreparedExpr>,
}

impl SqliteEngine {
    /// Opens the in-memory backing store
    pub fn open_in_memory() -> ComputedResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ComputedError::EngineOpen(e.to_string()))?;
        conn.set_prepared_statement_cache_capacity(64);
        Ok(Self {
            conn,
            exprs: Vec::new(),
        })
    }

    fn expr(&self, handle: ExprHandle) -> ComputedResult<&PreparedExpr> {
        self.exprs.get(handle.0).ok_or(ComputedError::InvalidHandle)
    }
}

impl ExpressionEngine for SqliteEngine {
    fn prepare(&mut self, expr: &str) -> ComputedResult<ExprHandle> {
        let parameter_count = {
            let stmt = self
                .conn
                .prepare_cached(expr)
                .map_err(|e| ComputedError::Prepare(e.to_string()))?;
            stmt.parameter_count()
        };
        self.exprs.push(PreparedExpr {
            sql: expr.to_string(),
            binds: vec![SqlValue::Null; parameter_count],
        });
        Ok(ExprHandle(self.exprs.len() - 1))
    }

    fn bind(
        &mut self,
        handle: ExprHandle,
        position: usize,
        value: BindValue<'_>,
    ) -> ComputedResult<()> {
        let expr = self
            .exprs
            .get_mut(handle.0)
            .ok_or(ComputedError::InvalidHandle)?;
        let count = expr.binds.len();
        let slot = expr
            .binds
            .get_mut(position)
            .ok_or(ComputedError::BindOutOfRange { position, count })?;
        *slot = match value {
            BindValue::Null => SqlValue::Null,
            BindValue::Integer(v) => SqlValue::Integer(i64::from(v)),
            BindValue::Integer64(v) => SqlValue::Integer(v),
            BindValue::Real(v) => SqlValue::Real(v),
            BindValue::Text(v) => SqlValue::Text(v.to_string()),
        };
        Ok(())
    }

    fn step(&mut self, handle: ExprHandle) -> ComputedResult<Option<OutputValue>> {
        let expr = self.expr(handle)?;
        let mut stmt = self
            .conn
            .prepare_cached(&expr.sql)
            .map_err(|e| ComputedError::Evaluate(e.to_string()))?;

        if stmt.column_count() != 1 {
            return Ok(None);
        }

        let mut rows = stmt
            .query(rusqlite::params_from_iter(expr.binds.iter()))
            .map_err(|e| ComputedError::Evaluate(e.to_string()))?;
        let Some(row) = rows.next().map_err(|e| ComputedError::Evaluate(e.to_string()))? else {
            return Ok(None);
        };

        let value = match row
            .get_ref(0)
            .map_err(|e| ComputedError::Evaluate(e.to_string()))?
        {
            ValueRef::Integer(v) => Some(OutputValue::Integer(v)),
            ValueRef::Real(v) => Some(OutputValue::Real(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .ok()
                .map(|s| OutputValue::Text(s.to_string())),
            // NULL or blob results leave the target field unset
            _ => None,
        };
        Ok(value)
    }

    fn reset(&mut self, handle: ExprHandle) {
        if let Some(expr) = self.exprs.get_mut(handle.0) {
            for bind in &mut expr.binds {
                *bind = SqlValue::Null;
            }
        }
    }
}
