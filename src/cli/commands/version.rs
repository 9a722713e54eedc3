//! Version command - show version information

/// Print name and version, plus build details when `verbose`
pub fn print_version(verbose: bool) {
    println!("{} {}", crate::NAME, crate::VERSION);

    if verbose {
        println!();
        println!("Protocol:");
        println!("  SSH-1 RSA identities and challenges");
        println!("  SSH-2 RSA, DSA, ECDSA (P-256/384/521), Ed25519 and certificates");
        println!();
        println!("Build info:");
        println!("  Target:    {}", env!("KEYHOLD_BUILD_TARGET"));
        println!("  Rust:      {}", env!("RUSTC_VERSION"));
        if let Ok(exe) = std::env::current_exe() {
            println!("  Executable: {}", exe.display());
        }
    }
}
