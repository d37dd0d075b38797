//! Domain types: bars, price series, fills and the normalization factor.

pub mod bar;
pub mod fill;
pub mod norm;
pub mod series;

pub use bar::Bar;
pub use fill::{Fill, TradeLedger};
pub use norm::Norm;
pub use series::PriceSeries;
