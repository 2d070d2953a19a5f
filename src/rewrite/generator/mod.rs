// SQL token generators, one per rewrite concern
mod encrypt;
mod insert;
mod pagination;
mod projection;
mod shadow;
mod table;

pub(super) use shadow::shadow_removals;

use super::token::SqlToken;
use super::RewriteContext;
use crate::core::ShardingError;

/// Source of SQL tokens for one rewrite concern.
pub trait SqlTokenGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this generator has anything to contribute for the statement.
    fn is_generate(&self, context: &RewriteContext<'_>) -> bool;

    fn generate(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError>;
}

pub(super) fn generators() -> Vec<Box<dyn SqlTokenGenerator>> {
    vec![
        Box::new(table::TableTokenGenerator),
        Box::new(projection::DerivedProjectionTokenGenerator),
        Box::new(pagination::PaginationTokenGenerator),
        Box::new(encrypt::EncryptTokenGenerator),
        Box::new(insert::InsertTokenGenerator),
        Box::new(shadow::ShadowTokenGenerator),
    ]
}
