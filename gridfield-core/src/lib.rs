pub mod config;
pub mod datetime;
pub mod errors;
#[cfg(test)]
mod example_records;
pub mod field;
pub mod fieldlist;
pub mod geography;
pub mod metadata;
#[cfg(feature = "python")]
pub mod python;
pub mod resolver;
pub mod value;

pub use config::Settings;
pub use errors::{FieldError, FieldResult};
pub use field::{DataKey, Field};
pub use fieldlist::{FieldList, LsOptions, OrderKey, Selection, SortOrder};
pub use resolver::CoordinateResolver;
pub use value::{MetadataValue, Record};
