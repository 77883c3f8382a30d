mod fuel;
mod integrity;
mod ledger;
mod manifest;
mod roster;
mod units;

pub use fuel::*;
pub use integrity::*;
pub use ledger::*;
pub use manifest::*;
pub use roster::*;
pub use units::*;
