//! Observed objects and the root state facade.

mod application;
mod facade;
mod types;
mod window;

pub use application::{Application, ApplicationBackings, ApplicationDescriptor};
pub use facade::{ObjectDescriptor, State};
pub use types::{
    ApplicationId, ApplicationRef, ObjectRef, Point, Size, Validity, WindowId, WindowRef,
};
pub use window::{Window, WindowBackings, WindowDescriptor};
