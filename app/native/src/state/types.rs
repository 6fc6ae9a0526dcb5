//! Core handle and value types for observed objects.
//!
//! Objects are referenced through non-owning handles:
//! - `WindowRef` wraps a `WindowId` (from the window server)
//! - `ApplicationRef` wraps an `ApplicationId` (the process id)
//!
//! A handle stays meaningful after its object is gone; resolving it through
//! the `State` facade simply returns `None` at that point.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Stable window identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Stable application identifier (process id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i32);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ============================================================================
// Handles
// ============================================================================

/// Non-owning handle to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowRef {
    id: WindowId,
}

impl WindowRef {
    /// The window's identifier.
    #[must_use]
    pub const fn id(&self) -> WindowId { self.id }
}

impl From<WindowId> for WindowRef {
    fn from(id: WindowId) -> Self { Self { id } }
}

/// Non-owning handle to an application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationRef {
    id: ApplicationId,
}

impl ApplicationRef {
    /// The application's identifier.
    #[must_use]
    pub const fn id(&self) -> ApplicationId { self.id }
}

impl From<ApplicationId> for ApplicationRef {
    fn from(id: ApplicationId) -> Self { Self { id } }
}

/// A handle to any top-level object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectRef {
    Window(WindowRef),
    Application(ApplicationRef),
}

impl From<WindowRef> for ObjectRef {
    fn from(window: WindowRef) -> Self { Self::Window(window) }
}

impl From<ApplicationRef> for ObjectRef {
    fn from(application: ApplicationRef) -> Self { Self::Application(application) }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window(window) => write!(f, "window:{}", window.id()),
            Self::Application(app) => write!(f, "app:{}", app.id()),
        }
    }
}

// ============================================================================
// Geometry Types
// ============================================================================

/// A point in global screen coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "({}, {})", self.x, self.y) }
}

/// A size in points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self { Self { width, height } }

    /// Component-wise maximum, used to honour minimum sizes.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// Validity
// ============================================================================

/// Shared validity flag of an object.
///
/// Owned by the window or application and shared with each of its property
/// cells. Once cleared it never becomes valid again.
#[derive(Clone, Debug)]
pub struct Validity(Arc<AtomicBool>);

impl Default for Validity {
    fn default() -> Self { Self::new() }
}

impl Validity {
    /// Create a new, valid flag.
    #[must_use]
    pub fn new() -> Self { Self(Arc::new(AtomicBool::new(true))) }

    /// Whether the object still responds.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.0.load(Ordering::Acquire) }

    /// Mark the object invalid. Returns `true` if it was valid before.
    pub fn invalidate(&self) -> bool { self.0.swap(false, Ordering::AcqRel) }
}
