use super::DistroFamily;
use super::arch::suse_arch;
use super::signature::DistroSignature;
use crate::location::InstallLocation;

pub(super) const SUSE: DistroSignature = DistroSignature {
    family: DistroFamily::Suse,
    treeinfo_family: None,
    any_of: &["directory.yast"],
    all_of: &[],
    content: &[],
    paravirt: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuseProfile {
    pub(super) arch: String,
}

impl SuseProfile {
    pub fn kernel_paths(&self, paravirt: bool) -> (String, String) {
        let arch = suse_arch(&self.arch);
        if paravirt {
            (format!("boot/{arch}/vmlinuz-xen"), format!("boot/{arch}/initrd-xen"))
        } else {
            (format!("boot/{arch}/loader/linux"), format!("boot/{arch}/loader/initrd"))
        }
    }

    pub fn boot_iso_path(&self) -> String {
        "boot/boot.iso".to_string()
    }

    /// linuxrc only understands URL sources here.
    pub fn boot_args(&self, location: &InstallLocation) -> String {
        match location {
            InstallLocation::Http(url) | InstallLocation::Ftp(url) => format!("install={url}"),
            _ => String::new(),
        }
    }
}
