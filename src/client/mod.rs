//! Client-side reconciliation of the worker event stream.
//!
//! - [`view`]: the pure reducer and its rendered [`ViewState`]
//! - [`driver`]: a task that feeds the reducer and ticks a local clock
//! - [`sse`]: an SSE client that follows the server with reconnects
//! - [`filter`]: search, grouping and summary counts for display

pub mod driver;
pub mod error;
pub mod filter;
pub mod sse;
pub mod view;

pub use driver::{Clock, SystemClock, ViewDriver, ViewInput};
pub use error::ClientError;
pub use filter::{GroupBy, RecordGroup, UnknownGroupBy, ViewQuery, ViewStats};
pub use sse::{EventStreamClient, SseDecoder, SseFrame};
pub use view::{ClientView, ViewState};
