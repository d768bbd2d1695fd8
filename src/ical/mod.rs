//! iCalendar interchange codec.
//!
//! [`parser::decode`] turns calendar text into [`model::CalendarRecord`]s and
//! [`builder::encode`] turns records back into text. Both are pure and hold
//! no state between calls.

pub mod builder;
pub mod escape;
pub mod model;
pub mod parser;
pub mod time;

pub use builder::encode;
pub use model::CalendarRecord;
pub use parser::{decode, decode_with_diagnostics};
