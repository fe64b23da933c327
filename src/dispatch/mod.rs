//! Fan-out/fan-in core: concurrent dispatch, aggregation and the event stream

mod aggregate;
mod dispatcher;
mod observer;
mod stream;

pub use aggregate::*;
pub use dispatcher::*;
pub use observer::*;
pub use stream::{error_line, ResultStream, StreamEvent};
