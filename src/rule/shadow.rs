use std::collections::HashMap;

/// Marker column plus the shadow counterpart of each production data source.
#[derive(Debug, Clone, Default)]
pub struct ShadowRule {
    pub column: String,
    mappings: HashMap<String, String>,
}

impl ShadowRule {
    #[must_use]
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_lowercase(),
            mappings: HashMap::new(),
        }
    }

    pub fn add_mapping(&mut self, data_source: &str, shadow_data_source: &str) {
        self.mappings.insert(data_source.to_string(), shadow_data_source.to_string());
    }

    #[must_use]
    pub fn shadow_of(&self, data_source: &str) -> Option<&str> {
        self.mappings.get(data_source).map(String::as_str)
    }

    #[must_use]
    pub fn is_shadow_column(&self, column: &str) -> bool {
        self.column.eq_ignore_ascii_case(column)
    }

    pub fn mappings(&self) -> impl Iterator<Item = (&String, &String)> {
        self.mappings.iter()
    }
}
