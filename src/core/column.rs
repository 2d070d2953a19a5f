use serde::{Deserialize, Serialize};
use super::data_type::DataType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    /// Value is produced by the database itself (SERIAL and friends)
    pub generated: bool,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: &str, data_type: DataType, primary_key: bool) -> Self {
        let generated = matches!(data_type, DataType::Serial | DataType::BigSerial);
        Self {
            name: name.to_lowercase(),
            data_type,
            primary_key,
            generated,
        }
    }
}
