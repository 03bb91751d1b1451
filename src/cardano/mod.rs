//! Address and datum plumbing for the small slice of Cardano this daemon
//! needs: Shelley address codecs and the Plutus datum tree of the order
//! contracts.

pub mod address;
pub mod datum;
