//! Transfer orchestration - turns one command invocation into uploads.

pub mod destination;
pub mod orchestrator;
pub mod report;
pub mod session;

pub use destination::{DestinationPlan, invocation_stamp, sanitize_subfolder};
pub use orchestrator::{Transfer, TransferOptions, TransferRequest, TransferSettings};
pub use report::{FailedUpload, Failure, Outcome, TransferReport, TransferSummary};
pub use session::{ChatSession, ImageSource, IncomingMessage, Uploader};
