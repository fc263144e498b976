//! Named tables of equal-length columns, persisted as FITS binary tables.

use std::path::Path;

use tracing::debug;

use crate::error::{EoError, Result};
use crate::io::fits::{FitsFile, FitsWriter, HduKind, Header};
use crate::io::write_atomic;

/// One typed column.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view of the column; integers are widened.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Self::Float(v) => Some(v.clone()),
            Self::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Self::Text(_) => None,
        }
    }

    /// Append `other`'s rows; columns of different types are left untouched.
    fn append(&mut self, other: &Column) {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.extend_from_slice(b),
            (Self::Int(a), Self::Int(b)) => a.extend_from_slice(b),
            (Self::Text(a), Self::Text(b)) => a.extend_from_slice(b),
            _ => {}
        }
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<String>> for Column {
    fn from(v: Vec<String>) -> Self {
        Self::Text(v)
    }
}

/// Ordered set of named columns sharing one row count.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<(String, Column)>,
}

impl Table {
    /// Build a table; every column must have the same length.
    pub fn new(name: &str, columns: Vec<(String, Column)>) -> Result<Self> {
        if let Some((_, first)) = columns.first() {
            let expected = first.len();
            if let Some((col, c)) = columns.iter().find(|(_, c)| c.len() != expected) {
                return Err(EoError::ColumnLengthMismatch {
                    table: name.to_string(),
                    column: col.clone(),
                    expected,
                    found: c.len(),
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| EoError::UnknownColumn(format!("{}.{name}", self.name)))
    }

    pub fn float(&self, name: &str) -> Result<&[f64]> {
        self.column(name)?
            .as_float()
            .ok_or_else(|| EoError::UnknownColumn(format!("{}.{name} is not float", self.name)))
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        self.column(name)?
            .as_text()
            .ok_or_else(|| EoError::UnknownColumn(format!("{}.{name} is not text", self.name)))
    }

    /// Add a column, or replace one with the same name.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.nrows() {
            return Err(EoError::ColumnLengthMismatch {
                table: self.name.clone(),
                column: name.to_string(),
                expected: self.nrows(),
                found: column.len(),
            });
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(self)
    }

    fn schema(&self) -> Vec<(&str, &'static str)> {
        self.columns
            .iter()
            .map(|(n, c)| (n.as_str(), c.type_name()))
            .collect()
    }

    /// Concatenate tables row-wise. Column names, order and types must match.
    pub fn vstack(name: &str, tables: &[&Table]) -> Result<Self> {
        let Some(first) = tables.first() else {
            return Table::new(name, Vec::new());
        };
        let schema = first.schema();
        let mut columns = first.columns.clone();
        for table in &tables[1..] {
            if table.schema() != schema {
                return Err(EoError::SchemaMismatch(format!(
                    "{} has columns {:?}, {} has {:?}",
                    first.name,
                    schema,
                    table.name,
                    table.schema()
                )));
            }
            for ((_, acc), (_, col)) in columns.iter_mut().zip(&table.columns) {
                acc.append(col);
            }
        }
        Table::new(name, columns)
    }
}

/// Ordered collection of named tables, written together to one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableStore {
    tables: Vec<Table>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table and add it to the store, replacing any table of the same name.
    pub fn make_table(&mut self, name: &str, columns: Vec<(String, Column)>) -> Result<&Table> {
        let table = Table::new(name, columns)?;
        Ok(self.add_table(table))
    }

    pub fn add_table(&mut self, table: Table) -> &Table {
        let idx = match self.tables.iter().position(|t| t.name == table.name) {
            Some(idx) => {
                self.tables[idx] = table;
                idx
            }
            None => {
                self.tables.push(table);
                self.tables.len() - 1
            }
        };
        &self.tables[idx]
    }

    pub fn get(&self, name: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EoError::UnknownTable(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Write every table as one BINTABLE extension, atomically.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, |out| {
            let mut writer = FitsWriter::new(out);
            let mut primary = Header::new();
            primary.set_int("NTABLES", self.tables.len() as i64);
            writer.write_primary(&primary)?;
            for table in &self.tables {
                writer.write_table(&table.name, &table.columns)?;
            }
            writer.finish()?;
            Ok(())
        })?;
        debug!(path = %path.display(), tables = self.tables.len(), "Persisted tables");
        Ok(())
    }

    /// Read every BINTABLE extension of `path`, in file order.
    pub fn load(path: &Path) -> Result<Self> {
        let fits = FitsFile::open(path)?;
        let mut store = Self::new();
        for index in 0..fits.num_hdus() {
            if fits.kind(index)? != HduKind::Table {
                continue;
            }
            let name = fits
                .header(index)?
                .get_str("EXTNAME")
                .map_or_else(|| format!("TABLE{index}"), str::to_string);
            let columns = fits.read_table(index)?;
            store.add_table(Table::new(&name, columns)?);
        }
        Ok(store)
    }
}
