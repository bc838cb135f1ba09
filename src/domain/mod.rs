pub mod audit;
pub mod chain;
pub mod kill_switch;
pub mod owner;
pub mod policy;
pub mod request;
pub mod transaction;
pub mod wallet;

pub use audit::*;
pub use chain::*;
pub use kill_switch::*;
pub use owner::*;
pub use policy::*;
pub use request::*;
pub use transaction::*;
pub use wallet::*;
