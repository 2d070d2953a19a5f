// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod column;
pub mod row;

// Re-exports for convenience
pub use error::ShardingError;
pub use value::Value;
pub use data_type::DataType;
pub use column::ColumnMetadata;
pub use row::Row;
