//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The value stored in a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A range of cells (e.g., "C10:C20")

mod address;
mod value;

pub use address::{CellAddress, CellRange};
pub use value::CellValue;
