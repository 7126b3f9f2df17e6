pub mod browserless;
pub mod extractor;
pub mod output;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod timestamp;
pub mod walker;

pub use browserless::BrowserlessRenderer;
pub use resolver::{resolve, slugify, NotFoundReason, Resolution};
pub use runner::{SessionLease, SubjectOutcome, SubjectRunner};
pub use scheduler::{BatchReport, BatchScheduler, SubjectReport, SubjectStatus};
pub use session::{BrowserSession, PageRenderer, RenderError, RenderRequest, RenderedPage, SessionError};
pub use walker::{walk, StopReason, WalkOutcome, WalkRequest};
