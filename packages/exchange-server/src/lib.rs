//! `Xchange` Server — cluster data exchange protocol runtime.

pub mod cluster;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
