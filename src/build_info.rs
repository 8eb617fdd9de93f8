//! Build metadata captured by `build.rs`

/// Crate version from `Cargo.toml`
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// When the binary was compiled
pub const BUILD_TIMESTAMP: &str = env!("VERGEN_BUILD_TIMESTAMP");

/// Optimization level (0, 1, 2, 3, s, z)
pub const CARGO_OPT_LEVEL: &str = env!("VERGEN_CARGO_OPT_LEVEL");

/// Target triple, e.g. x86_64-unknown-linux-gnu
pub const CARGO_TARGET_TRIPLE: &str = env!("VERGEN_CARGO_TARGET_TRIPLE");

pub const RUSTC_SEMVER: &str = env!("VERGEN_RUSTC_SEMVER");

/// stable, beta or nightly
pub const RUSTC_CHANNEL: &str = env!("VERGEN_RUSTC_CHANNEL");

/// `{version}+{target}.opt{level}`, e.g. `0.1.0+x86_64-unknown-linux-gnu.opt3`
pub fn version_string() -> String {
    format!("{}+{}.opt{}", PKG_VERSION, CARGO_TARGET_TRIPLE, CARGO_OPT_LEVEL)
}

/// One `key: value` line per build fact
pub fn detailed_info() -> Vec<String> {
    vec![
        format!("Version: {}", PKG_VERSION),
        format!("Built: {}", BUILD_TIMESTAMP),
        format!("Target: {}", CARGO_TARGET_TRIPLE),
        format!("Optimization: {}", CARGO_OPT_LEVEL),
        format!("Rustc: {} ({})", RUSTC_SEMVER, RUSTC_CHANNEL),
    ]
}
