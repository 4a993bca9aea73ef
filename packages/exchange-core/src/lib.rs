//! `Xchange` Core -- the cluster data exchange protocol's wire types and codec.
//!
//! - **Exchange** ([`exchange`]): cluster/node/partition identifiers, the
//!   binary wire codec for per-namespace partition-version payloads, and the
//!   namespace version inventory the commit engine writes into.

pub mod exchange;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
