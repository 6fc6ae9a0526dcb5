//! Observable property cells.
//!
//! [`Property`] holds an externally driven value, [`WriteableProperty`] adds
//! optimistic client writes reconciled against the backing's answers.

mod backing;
mod cell;
mod read_only;
mod writeable;

pub use backing::{AttributeBacking, WriteRequest};
pub use read_only::Property;
pub use writeable::WriteableProperty;
