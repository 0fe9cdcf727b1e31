use super::DistroFamily;
use super::signature::{ContentProbe, DistroSignature};
use crate::location::InstallLocation;

pub(super) const MANDRIVA: DistroSignature = DistroSignature {
    family: DistroFamily::Mandriva,
    treeinfo_family: None,
    any_of: &[],
    all_of: &[],
    content: &[ContentProbe {
        path: "VERSION",
        pattern: ".*Mandriva.*",
        version: Some(r"(?P<version>\d{4}(\.\d)?)"),
    }],
    paravirt: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandrivaProfile;

impl MandrivaProfile {
    pub fn kernel_paths(&self) -> (String, String) {
        ("isolinux/alt0/vmlinuz".to_string(), "isolinux/alt0/all.rdz".to_string())
    }

    pub fn boot_iso_path(&self) -> String {
        "install/images/boot.iso".to_string()
    }

    /// drakx `automatic=` line for network sources.
    pub fn boot_args(&self, location: &InstallLocation) -> String {
        match location {
            InstallLocation::Http(url) | InstallLocation::Ftp(url) => match url.host_str() {
                Some(host) => format!(
                    "automatic=method:{},server:{host},directory:{}",
                    url.scheme(),
                    url.path()
                ),
                None => String::new(),
            },
            InstallLocation::Nfs { server, export } => {
                format!("automatic=method:nfs,server:{server},directory:{export}")
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automatic_line_for_http() {
        let loc = InstallLocation::Http(url::Url::parse("http://mirror.example/mandriva/2008.1/i586/").unwrap());
        assert_eq!(
            MandrivaProfile.boot_args(&loc),
            "automatic=method:http,server:mirror.example,directory:/mandriva/2008.1/i586/"
        );
    }

    #[test]
    fn automatic_line_for_nfs() {
        let loc = InstallLocation::Nfs {
            server: "srv".into(),
            export: "/mdv".into(),
        };
        assert_eq!(MandrivaProfile.boot_args(&loc), "automatic=method:nfs,server:srv,directory:/mdv");
    }

    #[test]
    fn nothing_for_local_media() {
        let loc = InstallLocation::LocalPath("/isos/mdv.iso".into());
        assert_eq!(MandrivaProfile.boot_args(&loc), "");
    }
}
