//! Simulation engine: a bar-by-bar walk over a price series.
//!
//! Each bar is either skipped or filled; there is no pending order state and
//! nothing carries over between bars except the ledger itself:
//!
//! 1. Ask the contribution schedule whether the bar's date is a contribution day
//! 2. If so, size the order against the bar's own close (trade-on-close)
//! 3. Append the fill, or count a skip when the size truncates to zero

pub mod simulation;
pub mod sizing;

pub use simulation::{SimulationEngine, SimulationError};
pub use sizing::order_size;
