#![forbid(unsafe_code)]

//! Download lifecycle for short-form social video: analyze a URL, prepare a
//! video or audio file in a shared temp directory, hand it to the user, and
//! make sure nothing is left behind.

pub mod config;
pub mod error;
pub mod extractor;
pub mod janitor;
pub mod lifecycle;
pub mod logging;
pub mod media;
pub mod platform;
pub mod progress;
pub mod session;

pub use error::{Error, Result};
pub use lifecycle::{DownloadLifecycleManager, RetrievedFile};
pub use media::{AnalysisResult, MediaKind, PreparedFile};
pub use platform::{Platform, PlatformAdapter, PlatformRegistry};
pub use progress::{ProgressEvent, ProgressSink};
pub use session::{SessionState, SessionStore};
