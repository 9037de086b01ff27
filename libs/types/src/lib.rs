//! Types library for the market-data hub
//!
//! Wire-format primitives shared by every crate in the workspace,
//! ensuring deterministic arithmetic and stable JSON encodings.
//!
//! # Modules
//! - `numeric`: fixed-point decimal and integer-amount string serialization
//! - `side`: order side with the upstream chain's numeric encoding
//! - `coin`: coin amounts (`{"denom":..,"amount":..}`) and denom extraction

pub mod coin;
pub mod numeric;
pub mod side;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coin::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
}
