//! API handlers module

pub mod graph;
pub mod health;
pub mod nodes;
pub mod recommends;

use transient_common::errors::{AppError, Result};
use validator::Validate;

fn validate<T: Validate>(request: &T) -> Result<()> {
    request.validate().map_err(|e| {
        let field = e.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: e.to_string(),
            field,
        }
    })
}
