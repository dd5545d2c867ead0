use anyhow::Result;
use err_derive::Error;

/// A drink row as it sits in storage. The recipe is kept as the serialized
/// text blob; decoding it is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i32,
    pub title: String,
    pub recipe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "a drink titled {:?} already exists", _0)]
pub struct DuplicateTitle(pub String);

/// One connection's worth of access to the drink table. Every mutating
/// call commits exactly one row change before returning.
pub trait Storage {
    /// Creates the table if it is missing.
    fn setup(&mut self) -> Result<()>;
    /// Drops and recreates the table, discarding every row.
    fn reset(&mut self) -> Result<()>;
    /// All rows, ordered by id.
    fn list(&mut self) -> Result<Vec<Record>>;
    fn load(&mut self, id: i32) -> Result<Option<Record>>;
    /// Fails with [`DuplicateTitle`] when the title is taken.
    fn insert(&mut self, title: &str, recipe: &str) -> Result<Record>;
    /// Replaces the given columns; `None` keeps the stored value untouched.
    /// Returns `None` when no row has that id.
    fn update(&mut self, id: i32, title: Option<&str>, recipe: Option<&str>)
        -> Result<Option<Record>>;
    /// Returns whether a row was removed.
    fn delete(&mut self, id: i32) -> Result<bool>;
}
