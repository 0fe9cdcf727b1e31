//! Minimal reader for the `.treeinfo` INI manifest shipped with Red Hat
//! style install trees.

use std::collections::HashMap;

pub const TREEINFO: &str = ".treeinfo";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeInfo {
    sections: HashMap<String, HashMap<String, String>>,
}

impl TreeInfo {
    /// Parse INI text. Unknown lines are ignored; keys are case-sensitive,
    /// section names are not.
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_ascii_lowercase();
                sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some(section) = current.as_ref() else {
                continue;
            };
            if let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) {
                sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { sections }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_ascii_lowercase())?
            .get(key)
            .map(String::as_str)
    }

    pub fn family(&self) -> Option<&str> {
        self.get("general", "family")
    }

    pub fn version(&self) -> Option<&str> {
        self.get("general", "version")
    }

    pub fn arch(&self) -> Option<&str> {
        self.get("general", "arch")
    }

    /// Kernel and initrd paths from an `[images-*]` section.
    pub fn kernel_pair(&self, section: &str) -> Option<(&str, &str)> {
        Some((self.get(section, "kernel")?, self.get(section, "initrd")?))
    }

    /// `(algorithm, hex digest)` recorded for `path` under `[checksums]`.
    pub fn checksum(&self, path: &str) -> Option<(&str, &str)> {
        self.get("checksums", path)?.split_once(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEDORA: &str = "\
[general]
family = Fedora
timestamp = 1210884917.47
variant =
totaldiscs = 1
version = 9
discnum = 1
packagedir = Packages
arch = x86_64

[images-x86_64]
kernel = images/pxeboot/vmlinuz
initrd = images/pxeboot/initrd.img
boot.iso = images/boot.iso

[images-xen]
kernel = images/xen/vmlinuz
initrd = images/xen/initrd.img

[checksums]
images/pxeboot/vmlinuz = sha256:0a1b2c
";

    #[test]
    fn reads_general_section() {
        let ti = TreeInfo::parse(FEDORA);
        assert_eq!(ti.family(), Some("Fedora"));
        assert_eq!(ti.version(), Some("9"));
        assert_eq!(ti.arch(), Some("x86_64"));
        assert_eq!(ti.get("general", "variant"), Some(""));
    }

    #[test]
    fn reads_image_sections() {
        let ti = TreeInfo::parse(FEDORA);
        assert_eq!(
            ti.kernel_pair("images-xen"),
            Some(("images/xen/vmlinuz", "images/xen/initrd.img"))
        );
        assert_eq!(ti.get("images-x86_64", "boot.iso"), Some("images/boot.iso"));
        assert_eq!(ti.kernel_pair("images-ppc"), None);
    }

    #[test]
    fn reads_checksums() {
        let ti = TreeInfo::parse(FEDORA);
        assert_eq!(ti.checksum("images/pxeboot/vmlinuz"), Some(("sha256", "0a1b2c")));
        assert_eq!(ti.checksum("images/boot.iso"), None);
    }

    #[test]
    fn keys_before_any_section_are_ignored() {
        let ti = TreeInfo::parse("family = Bogus\n[General]\nfamily: CentOS\n");
        assert_eq!(ti.family(), Some("CentOS"));
    }
}
