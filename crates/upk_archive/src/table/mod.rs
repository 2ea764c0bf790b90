//! The three metadata tables of a package.
//!
//! Names are the dictionary every other table points into by index. Imports reference objects
//! living in other packages, exports are the objects stored in this one.

pub mod export;
pub mod import;
pub mod name;

pub use export::{ExportRow, ExportTable};
pub use import::{ImportRecord, ImportTable};
pub use name::NameTable;

/// Name of an object made unique by its instance number: `Name` or `Name_<instance-1>`
pub(crate) fn instance_name(base: &str, instance: i64) -> String {
    if instance == 0 {
        base.to_owned()
    } else {
        format!("{base}_{}", instance - 1)
    }
}
