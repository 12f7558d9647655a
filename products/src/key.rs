use std::fmt;

/// Kind under which every product record is stored.
pub const PRODUCTS_KIND: &str = "products";

/// Address of a single record in the store: a kind plus a string name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub kind: &'static str,
    pub name: String,
}

impl LookupKey {
    /// Builds the key of a product record. Terms are case-insensitive, so the
    /// name is always stored lowercase.
    pub fn product(term: &str) -> Self {
        LookupKey {
            kind: PRODUCTS_KIND,
            name: term.to_lowercase(),
        }
    }

    /// Path of the key as `kind/name`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}
