mod statement_cache;

pub use statement_cache::StatementCache;
