#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating most pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Module structure — our modules have router::Router style names by design
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod driver;
pub mod errors;
pub mod message;
pub mod middleware;
pub mod pattern;
pub mod router;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
