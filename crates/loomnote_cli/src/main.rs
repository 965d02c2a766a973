//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `loomnote_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("loomnote_core ping={}", loomnote_core::ping());
    println!("loomnote_core version={}", loomnote_core::core_version());
}
