use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardingError {
    // Configuration
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),
    #[error("Algorithm '{0}' is not registered")]
    AlgorithmNotFound(String),
    #[error("Binding tables '{0}' and '{1}' do not share the same data node layout")]
    BindingTableMismatch(String, String),
    #[error("Data source '{0}' not found")]
    DataSourceNotFound(String),
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    // Routing
    #[error("No sharding target for value {value} of column '{column}' among {available:?}")]
    NoRouteTarget {
        column: String,
        value: String,
        available: Vec<String>,
    },
    #[error("Cannot update sharding key: logic table '{table}', column '{column}'")]
    ShardingKeyUpdate { table: String, column: String },
    #[error("Route produced {units} units, exceeding the limit of {limit}")]
    RouteUnitLimitExceeded { units: usize, limit: usize },
    #[error("Column count doesn't match value count at row {0}")]
    InsertValueCountMismatch(usize),
    #[error("Parameter index {index} is out of range ({count} parameters supplied)")]
    ParameterOutOfRange { index: usize, count: usize },
    #[error("Route error: {0}")]
    Route(String),

    // Rewrite
    #[error("Overlapping SQL tokens: {first} [{first_start}, {first_end}) and {second} [{second_start}, {second_end}) in `{sql}`")]
    OverlappingTokens {
        sql: String,
        first: &'static str,
        first_start: usize,
        first_end: usize,
        second: &'static str,
        second_start: usize,
        second_end: usize,
    },
    #[error("SQL token from {generator} spans [{start}, {end}) outside SQL of length {len}: `{sql}`")]
    TokenOutOfRange {
        sql: String,
        generator: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    // Encryption
    #[error("Encrypt error: {0}")]
    Encrypt(String),

    // Execution
    #[error("Execution failed on data source '{data_source}': {message}")]
    Execution { data_source: String, message: String },

    // Merge
    #[error("Merge invariant violated: {0}")]
    MergeInvariant(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
