//! Architecture name mapping between the kernel's naming and the names
//! used inside distribution trees.

/// i386 through i686.
pub fn is_x86_32(arch: &str) -> bool {
    matches!(arch, "i386" | "i486" | "i586" | "i686")
}

/// Debian/Ubuntu installer directory names.
pub fn debian_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        a if is_x86_32(a) => "i386",
        a => a,
    }
}

/// SUSE `boot/<arch>` directory names.
pub fn suse_arch(arch: &str) -> &str {
    if is_x86_32(arch) { "i386" } else { arch }
}

/// Whether a tree built for `tree` can boot a guest of `wanted`.
pub fn compatible(wanted: &str, tree: &str) -> bool {
    wanted == tree || (is_x86_32(wanted) && is_x86_32(tree))
}
