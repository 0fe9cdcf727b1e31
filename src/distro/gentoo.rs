use super::DistroFamily;
use super::signature::DistroSignature;

const KERNEL: &str = "isolinux/gentoo";
const INITRD: &str = "isolinux/gentoo.igz";

/// Minimal install CD: kernel and initramfs live under `isolinux/`.
pub(super) const GENTOO: DistroSignature = DistroSignature {
    family: DistroFamily::Gentoo,
    treeinfo_family: None,
    any_of: &[],
    all_of: &[KERNEL, INITRD],
    content: &[],
    paravirt: false,
};

/// Same append line the CD's own isolinux config uses.
const LIVE_ARGS: &str = "root=/dev/ram0 init=/linuxrc looptype=squashfs loop=/image.squashfs cdroot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GentooProfile;

impl GentooProfile {
    pub fn kernel_paths(&self) -> (String, String) {
        (KERNEL.to_string(), INITRD.to_string())
    }

    pub fn boot_args(&self) -> String {
        LIVE_ARGS.to_string()
    }
}
