/*!
 * Monitoring
 * Structured tracing setup and timing spans
 */

mod tracer;

pub use tracer::{init_tracing, WorkloadSpan, ENV_TRACE_JSON};
