pub mod input;
pub mod output;

pub use input::{load_slices, SLICES_FILE};
pub use output::write_result;
