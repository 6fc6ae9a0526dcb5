//! Replay script format.
//!
//! A script is a JSONC document listing the notifications and writes to feed
//! a fresh `State`, in order:
//!
//! ```jsonc
//! {
//!   "name": "drag during move",
//!   "steps": [
//!     { "launch": { "pid": 1, "bundleId": "com.example.editor", "frontmost": true } },
//!     { "createWindow": { "id": 10, "pid": 1, "title": "notes.txt", "deferred": true } },
//!     { "write": { "target": { "window": 10 }, "value": { "position": { "x": 10, "y": 10 } } } },
//!     { "external": { "target": { "window": 10 }, "value": { "position": { "x": 50, "y": 50 } } } },
//!     "settle",
//!     { "destroyWindow": { "id": 10 } },
//!     { "terminate": { "pid": 1 } }
//!   ]
//! }
//! ```

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::WinstateError;
use crate::state::{Point, Size};

/// A named sequence of steps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

impl Script {
    /// Parse a script from JSONC.
    ///
    /// # Errors
    ///
    /// Returns [`WinstateError::Json`] if the document is malformed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, WinstateError> {
        let reader = json_comments::StripComments::new(reader);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Parse a script file.
    ///
    /// # Errors
    ///
    /// Returns [`WinstateError::Io`] if the file cannot be read, or
    /// [`WinstateError::Json`] if it is malformed.
    pub fn from_path(path: &Path) -> Result<Self, WinstateError> {
        let file = fs::File::open(path)?;
        Self::from_reader(file)
    }
}

/// One replay step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// An application starts.
    Launch(LaunchStep),
    /// A window appears.
    CreateWindow(CreateWindowStep),
    /// A client writes a property.
    Write(ChangeStep),
    /// The environment changes a property on its own.
    External(ChangeStep),
    /// Every deferred backing applies its queued writes.
    Settle,
    /// A window goes away.
    DestroyWindow { id: u32 },
    /// An application quits.
    Terminate { pid: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchStep {
    pub pid: i32,
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub frontmost: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWindowStep {
    pub id: u32,
    pub pid: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub position: Point,
    #[serde(default = "default_window_size")]
    pub size: Size,
    /// Smallest size the environment accepts; larger writes are clamped up.
    #[serde(default)]
    pub min_size: Option<Size>,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub fullscreen: bool,
    /// Hold writes until the next `settle` step instead of applying them
    /// immediately.
    #[serde(default)]
    pub deferred: bool,
}

const fn default_window_size() -> Size { Size::new(800.0, 600.0) }

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStep {
    pub target: Target,
    pub value: AttributeValue,
}

/// The object a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    Window(u32),
    Application(i32),
}

/// A new value for one attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeValue {
    Position(Point),
    Size(Size),
    Title(String),
    Minimized(bool),
    Fullscreen(bool),
    Hidden(bool),
    Frontmost(bool),
    MainWindow(Option<u32>),
    FocusedWindow(Option<u32>),
}

impl AttributeValue {
    /// Attribute name as written in scripts.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Position(_) => "position",
            Self::Size(_) => "size",
            Self::Title(_) => "title",
            Self::Minimized(_) => "minimized",
            Self::Fullscreen(_) => "fullscreen",
            Self::Hidden(_) => "hidden",
            Self::Frontmost(_) => "frontmost",
            Self::MainWindow(_) => "mainWindow",
            Self::FocusedWindow(_) => "focusedWindow",
        }
    }
}
