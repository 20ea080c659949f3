// core.rs splits the ledger into the sealed block, the append/verify ledger
// and the chain walk used to verify it.
pub mod chain;
pub mod ledger;
pub mod validation;

pub use chain::*;
pub use ledger::*;
pub use validation::*;
