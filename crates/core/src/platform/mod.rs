#[cfg(feature = "ash")]
pub mod ash;
#[cfg(test)]
pub mod dummy;
mod interface;

pub use interface::*;
