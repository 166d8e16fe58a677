//! `TypeDescriptor` — the per-oid metadata produced by introspection
//! (spec.md §3, §4.3).

/// The `pg_type.typtype` classification relevant to codec assembly.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum TypeKind {
    Base,
    Domain,
    Composite,
    Range,
    Pseudo,
    Enum,
}

impl TypeKind {
    pub fn from_pg_typtype(c: char) -> Self {
        match c {
            'b' => TypeKind::Base,
            'd' => TypeKind::Domain,
            'c' => TypeKind::Composite,
            'r' | 'm' => TypeKind::Range,
            'p' => TypeKind::Pseudo,
            'e' => TypeKind::Enum,
            _ => TypeKind::Base,
        }
    }
}

/// One row of resolved type metadata. Descriptors are immutable once built;
/// a schema change invalidates and rebuilds them rather than mutating in
/// place (spec.md §4.3 cache invalidation).
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub oid: u32,
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub base_oid: Option<u32>,
    pub elem_oid: Option<u32>,
    pub range_subtype_oid: Option<u32>,
    pub elem_has_binary_io: bool,
    pub attr_oids: Vec<u32>,
    pub attr_names: Vec<String>,
}

impl TypeDescriptor {
    /// Whether this type (after array/composite/domain/range unwrapping)
    /// can be exchanged in binary format. A missing element/subtype codec
    /// degrades the whole descriptor to text, per spec.md §4.3.
    pub fn supports_binary(&self) -> bool {
        match self.kind {
            TypeKind::Base | TypeKind::Enum | TypeKind::Pseudo => true,
            TypeKind::Domain | TypeKind::Range => self.elem_has_binary_io,
            TypeKind::Composite => self.elem_has_binary_io,
        }
    }

    pub fn is_array(&self) -> bool {
        self.elem_oid.is_some() && self.kind == TypeKind::Base
    }
}
