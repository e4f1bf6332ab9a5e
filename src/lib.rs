//! Screenwatch watches a screen region for configured template images and
//! clicks them.
//!
//! Templates are organised in a folder tree (`config`) whose folders carry
//! scheduling modes: cooldown groups, timer windows, image-triggered
//! priority episodes and ordered sequences. A background rebuild compiles
//! the tree into an immutable `bank::TemplateCache` that the scheduler
//! thread swaps in atomically. Each tick captures a frame, scores every
//! eligible template with ZNCC over a small scale sweep, and lets the state
//! machine in `engine` decide what to click.
//!
//! Screen capture (`screen-capture`) and mouse input (`input`) are optional
//! features; hosts may instead plug their own `capture::ScreenGrabber` and
//! `action::InputDriver`.

pub mod action;
pub mod bank;
pub mod capture;
pub mod config;
pub mod engine;
pub mod image;
pub mod kernel;
pub mod lifecycle;
pub mod quick_timer;
pub mod search;
pub mod template;
mod trace;
pub mod util;
pub mod worker;

pub use action::{ActionExecutor, InputDriver, MouseButton, WindowActivator, WindowHandle};
pub use bank::{CacheHandle, RebuildSummary, TemplateCache};
pub use capture::{CaptureManager, ScreenGrabber};
pub use config::{ConfigNode, ConfigTree, EngineSettings, FolderSettings, ItemPath, ItemSettings};
pub use engine::{Engine, EngineParts, EngineStatus, RecognitionArea, StateKind};
pub use crate::image::{Frame, FrameSet, ImageView, Plane, Rect};
pub use search::{MatchConfig, MatchEngine, MatchMode, MatchResult};
pub use util::{EngineError, EngineResult};
pub use worker::WorkerPool;
