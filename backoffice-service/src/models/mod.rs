pub mod balance;
pub mod dashboard;
pub mod expense;
pub mod extra;
pub mod ledger;
pub mod reference;
pub mod user;

pub use balance::*;
pub use dashboard::*;
pub use expense::*;
pub use extra::*;
pub use ledger::*;
pub use reference::*;
pub use user::*;
