//! Per-connection `(oid -> TypeDescriptor)` cache with introspection-driven
//! assembly (spec.md §3, §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::types::descriptor::{TypeDescriptor, TypeKind};
use crate::Result;

pub const OID_OID: u32 = 26;
pub const TEXT_OID: u32 = 25;
pub const BOOL_OID: u32 = 16;
pub const OID_ARRAY_OID: u32 = 1028;
pub const TEXT_ARRAY_OID: u32 = 1009;

/// One row of the introspection query (spec.md §6), already decoded from
/// the server's text-format `DataRow` -- the *columns the bootstrap table
/// knows* (`oid`, `text`, `bool`, and their arrays), not a general codec.
#[derive(Debug, Clone)]
pub struct IntrospectedTypeRow {
    pub oid: u32,
    pub namespace: String,
    pub name: String,
    pub kind: char,
    pub base_oid: Option<u32>,
    pub elem_oid: Option<u32>,
    pub range_subtype: Option<u32>,
    pub elem_has_bin_input: bool,
    pub elem_has_bin_output: bool,
    pub attr_type_oids: Vec<u32>,
    pub attr_names: Vec<String>,
}

/// Arena of resolved type descriptors, keyed by oid so that cyclic
/// references (a composite containing an array of itself) are represented
/// by oid rather than by pointer (spec.md §9 Design Note).
#[derive(Debug, Default)]
pub struct TypeRegistry {
    descriptors: HashMap<u32, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// The minimal built-in table needed to run the introspection query
    /// itself, before anything has been introspected (spec.md §4.3
    /// Bootstrap).
    pub fn bootstrap() -> Self {
        let mut registry = TypeRegistry::default();
        for (oid, name, elem_oid) in [
            (OID_OID, "oid", None),
            (TEXT_OID, "text", None),
            (BOOL_OID, "bool", None),
            (OID_ARRAY_OID, "_oid", Some(OID_OID)),
            (TEXT_ARRAY_OID, "_text", Some(TEXT_OID)),
        ] {
            registry.descriptors.insert(
                oid,
                Arc::new(TypeDescriptor {
                    oid,
                    namespace: "pg_catalog".to_owned(),
                    name: name.to_owned(),
                    kind: TypeKind::Base,
                    base_oid: None,
                    elem_oid,
                    range_subtype_oid: None,
                    elem_has_binary_io: true,
                    attr_oids: Vec::new(),
                    attr_names: Vec::new(),
                }),
            );
        }
        registry
    }

    pub fn get(&self, oid: u32) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(&oid).cloned()
    }

    pub fn contains(&self, oid: u32) -> bool {
        self.descriptors.contains_key(&oid)
    }

    /// Which of the given oids are not yet in the registry -- the set to
    /// hand to the introspection query.
    pub fn missing<'a>(&self, oids: impl IntoIterator<Item = &'a u32>) -> Vec<u32> {
        let mut missing: Vec<u32> = oids
            .into_iter()
            .copied()
            .filter(|oid| !self.contains(*oid))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }

    /// Assembles and inserts descriptors from introspection rows, which
    /// must arrive ordered by recursion depth descending (dependencies
    /// first) as the query in spec.md §6 guarantees.
    pub fn insert_rows(&mut self, rows: impl IntoIterator<Item = IntrospectedTypeRow>) -> Result<()> {
        for row in rows {
            let kind = TypeKind::from_pg_typtype(row.kind);

            let elem_has_binary_io = if let Some(elem_oid) = row.elem_oid {
                self.get(elem_oid)
                    .map(|d| d.supports_binary())
                    .unwrap_or(row.elem_has_bin_input && row.elem_has_bin_output)
            } else if !row.attr_type_oids.is_empty() {
                row.attr_type_oids.iter().all(|oid| {
                    self.get(*oid).map(|d| d.supports_binary()).unwrap_or(false)
                })
            } else if let Some(subtype) = row.range_subtype {
                self.get(subtype).map(|d| d.supports_binary()).unwrap_or(false)
            } else {
                row.elem_has_bin_input && row.elem_has_bin_output
            };

            let descriptor = TypeDescriptor {
                oid: row.oid,
                namespace: row.namespace,
                name: row.name,
                kind,
                base_oid: row.base_oid,
                elem_oid: row.elem_oid,
                range_subtype_oid: row.range_subtype,
                elem_has_binary_io,
                attr_oids: row.attr_type_oids,
                attr_names: row.attr_names,
            };

            self.descriptors.insert(descriptor.oid, Arc::new(descriptor));
        }
        Ok(())
    }

    /// Clears one oid's descriptor -- used on statement-shape drift (spec.md
    /// §4.3 Row-shape drift) to force re-introspection of only the affected
    /// type.
    pub fn invalidate(&mut self, oid: u32) {
        self.descriptors.remove(&oid);
    }

    /// Clears every descriptor whose build depended, directly or
    /// transitively, on one of `oids`. Used when a user-type-codec override
    /// is installed or reset (spec.md §4.3).
    pub fn invalidate_dependents(&mut self, oids: &[u32]) {
        let mut dirty: Vec<u32> = oids.to_vec();
        loop {
            let mut newly_dirty = Vec::new();
            for (oid, descriptor) in &self.descriptors {
                if dirty.contains(oid) {
                    continue;
                }
                let depends = descriptor.elem_oid.map(|o| dirty.contains(&o)).unwrap_or(false)
                    || descriptor
                        .range_subtype_oid
                        .map(|o| dirty.contains(&o))
                        .unwrap_or(false)
                    || descriptor.attr_oids.iter().any(|o| dirty.contains(o));
                if depends {
                    newly_dirty.push(*oid);
                }
            }
            if newly_dirty.is_empty() {
                break;
            }
            dirty.extend(newly_dirty);
        }
        for oid in dirty {
            self.descriptors.remove(&oid);
        }
    }

    pub fn clear(&mut self) {
        self.descriptors.clear();
    }
}

/// Parses a PostgreSQL text-format one-dimensional array of non-null
/// elements, e.g. `{23,25,1043}` or `{a,"b c",d}`. Only what the bootstrap
/// introspection decode needs -- not a general array codec (out of scope
/// per spec.md §1).
pub fn parse_text_array(input: &str) -> Result<Vec<String>> {
    let trimmed = input.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| Error::protocol("malformed array literal from introspection query"))?;

    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_quotes => in_quotes = true,
            '"' if in_quotes => in_quotes = false,
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' if !in_quotes => {
                elements.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }
    elements.push(current);

    Ok(elements)
}

pub fn parse_oid_array(input: &str) -> Result<Vec<u32>> {
    parse_text_array(input)?
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| Error::protocol("malformed oid in introspection array"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_knows_the_introspection_query_types() {
        let registry = TypeRegistry::bootstrap();
        assert!(registry.contains(OID_OID));
        assert!(registry.contains(TEXT_OID));
        assert!(registry.contains(BOOL_OID));
        assert!(registry.contains(OID_ARRAY_OID));
        assert!(registry.contains(TEXT_ARRAY_OID));
        assert!(!registry.contains(1700));
    }

    #[test]
    fn missing_filters_and_dedups_known_oids() {
        let registry = TypeRegistry::bootstrap();
        let oids = [TEXT_OID, 1700, 1700, BOOL_OID, 23];
        assert_eq!(registry.missing(&oids), vec![23, 1700]);
    }

    #[test]
    fn parse_text_array_handles_plain_elements() {
        let elements = parse_text_array("{23,25,1043}").unwrap();
        assert_eq!(elements, vec!["23", "25", "1043"]);
    }

    #[test]
    fn parse_text_array_handles_quoted_elements_with_commas_and_escapes() {
        let elements = parse_text_array(r#"{a,"b,c","d\"e"}"#).unwrap();
        assert_eq!(elements, vec!["a", "b,c", "d\"e"]);
    }

    #[test]
    fn parse_text_array_handles_empty_array() {
        let elements = parse_text_array("{}").unwrap();
        assert!(elements.is_empty());
    }

    #[test]
    fn parse_text_array_rejects_missing_braces() {
        assert!(parse_text_array("23,25").is_err());
    }

    #[test]
    fn parse_oid_array_parses_numbers() {
        assert_eq!(parse_oid_array("{23,25,1043}").unwrap(), vec![23, 25, 1043]);
    }

    #[test]
    fn parse_oid_array_rejects_non_numeric_elements() {
        assert!(parse_oid_array("{23,notanoid}").is_err());
    }

    #[test]
    fn invalidate_dependents_follows_element_and_attribute_chains() {
        let mut registry = TypeRegistry::bootstrap();
        registry
            .insert_rows([
                IntrospectedTypeRow {
                    oid: 50000,
                    namespace: "public".to_owned(),
                    name: "widget".to_owned(),
                    kind: 'c',
                    base_oid: None,
                    elem_oid: None,
                    range_subtype: None,
                    elem_has_bin_input: false,
                    elem_has_bin_output: false,
                    attr_type_oids: vec![TEXT_OID],
                    attr_names: vec!["label".to_owned()],
                },
                IntrospectedTypeRow {
                    oid: 50001,
                    namespace: "public".to_owned(),
                    name: "_widget".to_owned(),
                    kind: 'b',
                    base_oid: None,
                    elem_oid: Some(50000),
                    range_subtype: None,
                    elem_has_bin_input: false,
                    elem_has_bin_output: false,
                    attr_type_oids: Vec::new(),
                    attr_names: Vec::new(),
                },
            ])
            .unwrap();

        assert!(registry.contains(50000));
        assert!(registry.contains(50001));

        registry.invalidate_dependents(&[TEXT_OID]);

        assert!(!registry.contains(50000));
        assert!(!registry.contains(50001));
        assert!(!registry.contains(TEXT_OID));
        assert!(registry.contains(BOOL_OID));
    }
}
