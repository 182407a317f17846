//! Leveraged position math and input bounds.

pub mod bounds;
pub mod calc;

pub use bounds::BoundsValidator;
pub use calc::project;

/// Standing advisory shown next to every projection.
pub const SLIPPAGE_DISCLAIMER: &str = "The final values may slightly differ from this calculator due to exchange rate volatility and slippage.";
