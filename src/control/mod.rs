//! Control module - collaborators outside the data path.
//!
//! - [`ErrorHandler`] - sink for errors a session reports and continues past
//! - [`ControlSession`] - correlated error responses and recording signals
//!   back to a control client, fire-and-forget
//! - [`ErrorResponse`] - wire codec of an error response
//!
//! # Example
//!
//! ```
//! use termwire::control::{ControlSession, ErrorResponse, QueuedControlSession};
//!
//! let session = QueuedControlSession::new(1);
//! session.attempt_error_response(42, "unable to delete segment file");
//!
//! let response = ErrorResponse::decode(&session.poll_response().unwrap()).unwrap();
//! assert_eq!(response.offending_correlation_id, 42);
//! ```

mod error_handler;
mod error_response;
mod session;

pub use error_handler::{ErrorHandler, LoggingErrorHandler};
pub use error_response::{ErrorCode, ErrorResponse, ERROR_RESPONSE_HEADER_LENGTH};
pub use session::{ControlSession, QueuedControlSession, RecordingSignal, SignalEvent, NULL_VALUE};
