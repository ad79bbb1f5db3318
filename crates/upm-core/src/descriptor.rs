//! Static driver descriptors.

use crate::tags::{Category, Protocol};
use serde::Serialize;

/// Immutable introspection record published by every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    /// Short part name, e.g. `"bmp280"`
    pub name: &'static str,
    /// One-line human description
    pub description: &'static str,
    /// I/O protocols the driver can use
    pub protocols: &'static [Protocol],
    /// Capability tables the driver publishes
    pub categories: &'static [Category],
}

impl Descriptor {
    /// Whether the driver publishes a table for `category`.
    pub fn supports(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Whether the driver can run over `protocol`.
    pub fn uses(&self, protocol: Protocol) -> bool {
        self.protocols.contains(&protocol)
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.description)
    }
}
