//! The driver's top-level error type, and the PostgreSQL server-error kind
//! derived mechanically from the SQLSTATE class (first two characters).

use std::error::Error as StdError;
use std::fmt;

/// Wraps a plain message so it can flow through
/// [`pgwire_core::Error::configuration`], which expects a boxed `StdError`.
#[derive(Debug)]
struct ConfigMessage(String);

impl fmt::Display for ConfigMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for ConfigMessage {}

use pgwire_core::error::DatabaseError;

use crate::message::ErrorFields;

/// A PostgreSQL server error or notice, with the SQLSTATE-derived
/// [`ErrorKind`] resolved once at construction.
#[derive(Debug, Clone)]
pub struct PgDatabaseError {
    fields: ErrorFields,
    kind: ErrorKind,
}

impl PgDatabaseError {
    pub(crate) fn new(fields: ErrorFields) -> Self {
        let kind = ErrorKind::from_sqlstate(&fields.code);
        PgDatabaseError { fields, kind }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn sqlstate(&self) -> &str {
        &self.fields.code
    }

    pub fn severity(&self) -> &str {
        &self.fields.severity
    }

    pub fn message(&self) -> &str {
        &self.fields.message
    }

    pub fn detail(&self) -> Option<&str> {
        self.fields.detail.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.fields.hint.as_deref()
    }

    pub fn position(&self) -> Option<&str> {
        self.fields.position.as_deref()
    }

    pub fn internal_position(&self) -> Option<&str> {
        self.fields.internal_position.as_deref()
    }

    pub fn internal_query(&self) -> Option<&str> {
        self.fields.internal_query.as_deref()
    }

    pub fn where_(&self) -> Option<&str> {
        self.fields.where_.as_deref()
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.fields.schema_name.as_deref()
    }

    pub fn table_name(&self) -> Option<&str> {
        self.fields.table_name.as_deref()
    }

    pub fn column_name(&self) -> Option<&str> {
        self.fields.column_name.as_deref()
    }

    pub fn data_type_name(&self) -> Option<&str> {
        self.fields.data_type_name.as_deref()
    }

    pub fn constraint_name(&self) -> Option<&str> {
        self.fields.constraint_name.as_deref()
    }

    pub fn server_source_filename(&self) -> Option<&str> {
        self.fields.server_source_filename.as_deref()
    }

    pub fn server_source_line(&self) -> Option<&str> {
        self.fields.server_source_line.as_deref()
    }

    pub fn server_source_function(&self) -> Option<&str> {
        self.fields.server_source_function.as_deref()
    }
}

impl fmt::Display for PgDatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.fields.severity, self.fields.code, self.fields.message)
    }
}

impl StdError for PgDatabaseError {}

impl DatabaseError for PgDatabaseError {
    fn code(&self) -> Option<&str> {
        Some(&self.fields.code)
    }

    fn message(&self) -> &str {
        &self.fields.message
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }
}

/// The mechanical SQLSTATE-class → kind mapping from spec.md §7. Built as a
/// `match` over the first two characters rather than a runtime class graph.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    Warning,
    NoData,
    SqlStatementNotYetComplete,
    ConnectionException,
    TriggeredActionException,
    FeatureNotSupported,
    InvalidTransactionInitiation,
    LocatorException,
    InvalidGrantor,
    InvalidRoleSpecification,
    DiagnosticsException,
    CaseNotFound,
    CardinalityViolation,
    DataException,
    IntegrityConstraintViolation,
    InvalidCursorState,
    InvalidTransactionState,
    InvalidSqlStatementName,
    TriggeredDataChangeViolation,
    InvalidAuthorizationSpecification,
    DependentPrivilegeDescriptorsStillExist,
    InvalidTransactionTermination,
    SqlRoutineException,
    InvalidCursorName,
    ExternalRoutineException,
    ExternalRoutineInvocationException,
    SavepointException,
    InvalidCatalogName,
    InvalidSchemaName,
    TransactionRollback,
    SyntaxErrorOrAccessRuleViolation,
    WithCheckOptionViolation,
    InsufficientResources,
    ProgramLimitExceeded,
    ObjectNotInPrerequisiteState,
    OperatorIntervention,
    SystemError,
    ConfigurationFileError,
    ForeignDataWrapperError,
    PlpgsqlError,
    InternalError,
    /// Not one of the standard classes above (or `code` was empty/unknown).
    Unknown,
}

impl ErrorKind {
    pub fn from_sqlstate(code: &str) -> Self {
        use ErrorKind::*;

        let class = code.get(0..2).unwrap_or("");
        match class {
            "00" => Warning, // successful_completion never reaches here in practice
            "01" => Warning,
            "02" => NoData,
            "03" => SqlStatementNotYetComplete,
            "08" => ConnectionException,
            "09" => TriggeredActionException,
            "0A" => FeatureNotSupported,
            "0B" => InvalidTransactionInitiation,
            "0F" => LocatorException,
            "0L" => InvalidGrantor,
            "0P" => InvalidRoleSpecification,
            "0Z" => DiagnosticsException,
            "20" => CaseNotFound,
            "21" => CardinalityViolation,
            "22" => DataException,
            "23" => IntegrityConstraintViolation,
            "24" => InvalidCursorState,
            "25" => InvalidTransactionState,
            "26" => InvalidSqlStatementName,
            "27" => TriggeredDataChangeViolation,
            "28" => InvalidAuthorizationSpecification,
            "2B" => DependentPrivilegeDescriptorsStillExist,
            "2D" => InvalidTransactionTermination,
            "2F" => SqlRoutineException,
            "34" => InvalidCursorName,
            "38" => ExternalRoutineException,
            "39" => ExternalRoutineInvocationException,
            "3B" => SavepointException,
            "3D" => InvalidCatalogName,
            "3F" => InvalidSchemaName,
            "40" => TransactionRollback,
            "42" => SyntaxErrorOrAccessRuleViolation,
            "44" => WithCheckOptionViolation,
            "53" => InsufficientResources,
            "54" => ProgramLimitExceeded,
            "55" => ObjectNotInPrerequisiteState,
            "57" => OperatorIntervention,
            "58" => SystemError,
            "F0" => ConfigurationFileError,
            "HV" => ForeignDataWrapperError,
            "P0" => PlpgsqlError,
            "XX" => InternalError,
            _ => Unknown,
        }
    }

    /// `true` for SQLSTATE class `28` — authentication failures, which spec
    /// §7 treats as a distinct, always-fatal kind.
    pub fn is_authentication(self) -> bool {
        matches!(self, ErrorKind::InvalidAuthorizationSpecification)
    }
}

/// Top-level driver error, wrapping [`pgwire_core::Error`] the way
/// `sqlx::Error` wraps `sqlx_core::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] pgwire_core::Error),

    /// Every `ErrorResponse` received outside of startup. Carries the
    /// offending query text when the call site knows it (spec §7).
    #[error("{source}")]
    Database {
        #[source]
        source: Box<PgDatabaseError>,
        query: Option<String>,
    },

    /// An `ErrorResponse` during the startup/authentication phase. Always
    /// fatal to the connection.
    #[error("authentication failed: {0}")]
    Authentication(Box<PgDatabaseError>),

    /// SQLSTATE `0A000` surfaced by `RevalidateCachedQuery` -- spec §4.3/§4.4.
    #[error("cached statement plan is invalid due to a database schema or configuration change")]
    InvalidCachedStatement,

    /// Composite/array/domain descriptor drift detected during row decode --
    /// spec §4.3.
    #[error("outdated schema cache: {0}")]
    OutdatedSchemaCache(String),

    /// Row or column decoding failed (wrong type, malformed wire value).
    #[error("decode error: {0}")]
    Decode(String),

    /// Caller misuse: operation on a released pool connection, cursor
    /// outside a transaction, nested incompatible scopes, operation after
    /// close.
    #[error("interface error: {0}")]
    Interface(String),

    /// The current `Transaction` is in the `FAILED` state; only `rollback`
    /// is permitted.
    #[error("current transaction is aborted, commands ignored until end of transaction block")]
    InFailedTransaction,

    /// A pool `acquire` (or any other operation) exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The client-issued `cancel()` completed (distinguished from a
    /// server-initiated cancellation per spec §7 point 7).
    #[error("query was cancelled")]
    Cancelled,

    /// Row count, column index, or other invariant violated locally with no
    /// server round trip involved.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Core(pgwire_core::Error::protocol(msg))
    }

    pub fn interface(msg: impl Into<String>) -> Self {
        Error::Interface(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Core(pgwire_core::Error::configuration(ConfigMessage(msg.into())))
    }

    pub(crate) fn database(fields: ErrorFields, query: Option<String>) -> Self {
        Error::Database {
            source: Box::new(PgDatabaseError::new(fields)),
            query,
        }
    }

    pub(crate) fn authentication(fields: ErrorFields) -> Self {
        Error::Authentication(Box::new(PgDatabaseError::new(fields)))
    }

    /// Applies the two special SQLSTATE translations from spec §7. The
    /// `0A000` case is PostgreSQL's own wording for a stale cached plan
    /// ("cached plan must not change result type" / "... param types"),
    /// raised when `stmt_cache` revalidates a statement whose underlying
    /// schema changed.
    pub(crate) fn from_error_response(fields: ErrorFields, query: Option<String>) -> Self {
        if fields.code == "0A000" && fields.message.starts_with("cached plan must not change") {
            return Error::InvalidCachedStatement;
        }
        Error::database(fields, query)
    }

    pub fn as_database_error(&self) -> Option<&PgDatabaseError> {
        match self {
            Error::Database { source, .. } => Some(source),
            Error::Authentication(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_sqlstate_maps_known_classes() {
        assert_eq!(ErrorKind::from_sqlstate("23505"), ErrorKind::IntegrityConstraintViolation);
        assert_eq!(ErrorKind::from_sqlstate("08006"), ErrorKind::ConnectionException);
        assert_eq!(ErrorKind::from_sqlstate("42601"), ErrorKind::SyntaxErrorOrAccessRuleViolation);
        assert_eq!(ErrorKind::from_sqlstate("28P01"), ErrorKind::InvalidAuthorizationSpecification);
        assert_eq!(ErrorKind::from_sqlstate("XX000"), ErrorKind::InternalError);
    }

    #[test]
    fn from_sqlstate_falls_back_to_unknown() {
        assert_eq!(ErrorKind::from_sqlstate(""), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_sqlstate("Q9"), ErrorKind::Unknown);
        assert_eq!(ErrorKind::from_sqlstate("4"), ErrorKind::Unknown);
    }

    #[test]
    fn is_authentication_only_true_for_class_28() {
        assert!(ErrorKind::from_sqlstate("28000").is_authentication());
        assert!(!ErrorKind::from_sqlstate("23505").is_authentication());
    }

    #[test]
    fn invalid_cached_plan_message_becomes_invalid_cached_statement() {
        let fields = ErrorFields {
            severity: "ERROR".to_owned(),
            code: "0A000".to_owned(),
            message: "cached plan must not change result type".to_owned(),
            ..ErrorFields::default()
        };
        let err = Error::from_error_response(fields, None);
        assert!(matches!(err, Error::InvalidCachedStatement));
    }

    #[test]
    fn other_0a000_errors_stay_database_errors() {
        let fields = ErrorFields {
            severity: "ERROR".to_owned(),
            code: "0A000".to_owned(),
            message: "unsupported feature".to_owned(),
            ..ErrorFields::default()
        };
        let err = Error::from_error_response(fields, Some("SELECT 1".to_owned()));
        match err {
            Error::Database { source, query } => {
                assert_eq!(source.kind(), ErrorKind::FeatureNotSupported);
                assert_eq!(query.as_deref(), Some("SELECT 1"));
            }
            other => panic!("expected Error::Database, got {other:?}"),
        }
    }

    #[test]
    fn database_error_exposes_sqlstate_derived_kind() {
        let fields = ErrorFields {
            severity: "ERROR".to_owned(),
            code: "23505".to_owned(),
            message: "duplicate key value violates unique constraint".to_owned(),
            ..ErrorFields::default()
        };
        let db_err = PgDatabaseError::new(fields);
        assert_eq!(db_err.kind(), ErrorKind::IntegrityConstraintViolation);
        assert_eq!(db_err.sqlstate(), "23505");
        assert!(db_err.detail().is_none());
    }
}
