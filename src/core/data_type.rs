use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    // Numeric types
    SmallInt,
    Integer,
    Real,
    Numeric { precision: u8, scale: u8 }, // NUMERIC(p, s)
    Serial,       // Auto-incrementing INTEGER
    BigSerial,    // Auto-incrementing BIGINT
    // String types
    Text,
    Varchar { max_length: usize },  // VARCHAR(n)
    Char { length: usize },         // CHAR(n)
    // Boolean
    Boolean,
    // Date/Time types
    Date,
    Timestamp,
    // Special types
    Uuid,
}

impl DataType {
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::SmallInt | Self::Integer | Self::Real | Self::Numeric { .. } | Self::Serial | Self::BigSerial
        )
    }
}
