//! The fixed introspection queries from spec.md §6, sent bit-for-bit.

/// Recursive closure over `typelem`/`rngsubtype`/composite attribute oids,
/// ordered by recursion depth descending so dependencies arrive before their
/// dependents (spec.md §4.3, §6).
pub const INTROSPECT_TYPES_QUERY: &str = r#"
WITH RECURSIVE typeinfo_tree(
    oid, ns, name, kind, basetype, elemtype, range_subtype,
    elem_has_bin_input, elem_has_bin_output, attrtypoids, attrnames, depth)
AS (
    WITH composite_attrs AS (
        SELECT c.reltype AS comptype_oid,
               array_agg(ia.atttypid ORDER BY ia.attnum) AS typoids,
               array_agg(ia.attname::text ORDER BY ia.attnum) AS names
        FROM pg_attribute ia
        JOIN pg_class c ON ia.attrelid = c.oid
        WHERE ia.attnum > 0 AND NOT ia.attisdropped
        GROUP BY c.reltype
    ),
    typeinfo AS (
        SELECT
            t.oid AS oid,
            ns.nspname AS ns,
            t.typname AS name,
            t.typtype AS kind,
            CASE WHEN t.typtype = 'd' THEN t.typbasetype ELSE NULL::oid END AS basetype,
            t.typelem AS elemtype,
            r.rngsubtype AS range_subtype,
            coalesce(te.typreceive::text, '') != '' AS elem_has_bin_input,
            coalesce(te.typsend::text, '') != '' AS elem_has_bin_output,
            ca.typoids AS attrtypoids,
            ca.names AS attrnames,
            0 AS depth
        FROM pg_type t
        JOIN pg_namespace ns ON ns.oid = t.typnamespace
        LEFT JOIN pg_type te ON te.oid = t.typelem
        LEFT JOIN pg_range r ON r.rngtypid = t.oid
        LEFT JOIN composite_attrs ca ON ca.comptype_oid = t.oid
    )
    SELECT * FROM typeinfo WHERE oid = any($1::oid[])
    UNION ALL
    SELECT ti.* FROM typeinfo ti, typeinfo_tree tt
    WHERE (tt.elemtype = ti.oid) OR (ti.oid = any(tt.attrtypoids))
       OR (tt.range_subtype = ti.oid)
)
SELECT DISTINCT * FROM typeinfo_tree ORDER BY depth DESC;
"#;

/// For PostgreSQL servers older than 9.2, which lack `pg_range`: elides the
/// join and reports `range_subtype` as `NULL::oid`.
pub const INTROSPECT_TYPES_QUERY_NO_RANGE: &str = r#"
WITH RECURSIVE typeinfo_tree(
    oid, ns, name, kind, basetype, elemtype, range_subtype,
    elem_has_bin_input, elem_has_bin_output, attrtypoids, attrnames, depth)
AS (
    WITH composite_attrs AS (
        SELECT c.reltype AS comptype_oid,
               array_agg(ia.atttypid ORDER BY ia.attnum) AS typoids,
               array_agg(ia.attname::text ORDER BY ia.attnum) AS names
        FROM pg_attribute ia
        JOIN pg_class c ON ia.attrelid = c.oid
        WHERE ia.attnum > 0 AND NOT ia.attisdropped
        GROUP BY c.reltype
    ),
    typeinfo AS (
        SELECT
            t.oid AS oid,
            ns.nspname AS ns,
            t.typname AS name,
            t.typtype AS kind,
            CASE WHEN t.typtype = 'd' THEN t.typbasetype ELSE NULL::oid END AS basetype,
            t.typelem AS elemtype,
            NULL::oid AS range_subtype,
            coalesce(te.typreceive::text, '') != '' AS elem_has_bin_input,
            coalesce(te.typsend::text, '') != '' AS elem_has_bin_output,
            ca.typoids AS attrtypoids,
            ca.names AS attrnames,
            0 AS depth
        FROM pg_type t
        JOIN pg_namespace ns ON ns.oid = t.typnamespace
        LEFT JOIN pg_type te ON te.oid = t.typelem
        LEFT JOIN composite_attrs ca ON ca.comptype_oid = t.oid
    )
    SELECT * FROM typeinfo WHERE oid = any($1::oid[])
    UNION ALL
    SELECT ti.* FROM typeinfo ti, typeinfo_tree tt
    WHERE (tt.elemtype = ti.oid) OR (ti.oid = any(tt.attrtypoids))
)
SELECT DISTINCT * FROM typeinfo_tree ORDER BY depth DESC;
"#;

/// Used by `set_type_codec` to resolve a type by `(name, schema)`.
pub const TYPE_BY_NAME_QUERY: &str = r#"
SELECT t.oid, t.typelem AS elemtype, t.typtype AS kind
FROM pg_type t JOIN pg_namespace ns ON ns.oid = t.typnamespace
WHERE t.typname = $1 AND ns.nspname = $2;
"#;
