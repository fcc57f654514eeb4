//! Build version reporting

/// Current version of codecomet (from Cargo.toml)
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version line printed by `codecomet version`
pub fn version_line() -> String {
    format!("codecomet {}", CURRENT_VERSION)
}
