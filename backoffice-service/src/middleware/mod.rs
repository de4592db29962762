//! Request extractors.

pub mod actor;

pub use actor::{parse_user_id, Superuser, ACTOR_HEADER};
