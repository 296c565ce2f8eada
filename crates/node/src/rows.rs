/// A single result row with every column rendered as text.
pub type Row = Vec<String>;

/// Rows returned by an SQL statement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rows(Vec<Row>);

impl Rows {
    /// Wraps already collected rows.
    #[must_use]
    pub const fn new(rows: Vec<Row>) -> Self {
        Self(rows)
    }

    /// Returns the first column of the first row.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.0.first().and_then(|row| row.first()).map(String::as_str)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the statement returned no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Row>> for Rows {
    fn from(rows: Vec<Row>) -> Self {
        Self(rows)
    }
}
