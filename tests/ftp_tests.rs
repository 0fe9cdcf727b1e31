//! FTP transport and acquisition against an in-process FTP server.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use url::Url;
use virt_install_source::transport::FtpTransport;
use virt_install_source::{AcquireHints, AcquireOptions, Error, ProgressSink, acquire_kernel};

// =============================================================================
// Server
// =============================================================================

/// Files and directories below `/tree`. A directory named `locked` can be
/// entered but never left.
struct FtpTree {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
}

impl FtpTree {
    fn new(files: &[(&str, &[u8])], dirs: &[&str]) -> Self {
        let files: HashMap<String, Vec<u8>> = files
            .iter()
            .map(|(path, body)| (format!("/tree/{path}"), body.to_vec()))
            .collect();
        let mut all_dirs: HashSet<String> = dirs.iter().map(|d| format!("/tree/{d}")).collect();
        let seeds: Vec<String> = files.keys().chain(all_dirs.iter()).cloned().collect();
        for path in &seeds {
            let mut dir = path.as_str();
            while let Some((parent, _)) = dir.rsplit_once('/') {
                all_dirs.insert(if parent.is_empty() { "/".to_string() } else { parent.to_string() });
                dir = parent;
            }
        }
        Self { files, dirs: all_dirs }
    }
}

fn normalize(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') { arg.to_string() } else { format!("{cwd}/{arg}") };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

async fn reply(out: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    out.write_all(format!("{line}\r\n").as_bytes()).await
}

async fn serve(files: &[(&str, &[u8])], dirs: &[&str]) -> SocketAddr {
    let tree = Arc::new(FtpTree::new(files, dirs));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let tree = Arc::clone(&tree);
            tokio::spawn(async move {
                let _ = control(stream, tree).await;
            });
        }
    });
    addr
}

async fn control(stream: TcpStream, tree: Arc<FtpTree>) -> std::io::Result<()> {
    let (read, mut out) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut cwd = "/".to_string();
    let mut passive: Option<TcpListener> = None;

    reply(&mut out, "220 test server ready").await?;
    while let Some(line) = lines.next_line().await? {
        let (cmd, arg) = match line.split_once(' ') {
            Some((cmd, arg)) => (cmd.to_ascii_uppercase(), arg.trim().to_string()),
            None => (line.trim().to_ascii_uppercase(), String::new()),
        };

        match cmd.as_str() {
            "USER" => reply(&mut out, "331 password required").await?,
            "PASS" if arg == "wrong" => reply(&mut out, "530 login incorrect").await?,
            "PASS" => reply(&mut out, "230 logged in").await?,
            "TYPE" => reply(&mut out, "200 type set").await?,
            "CWD" => {
                let target = normalize(&cwd, &arg);
                if cwd.ends_with("/locked") && target != cwd {
                    reply(&mut out, "550 cannot leave").await?;
                } else if tree.dirs.contains(&target) {
                    cwd = target;
                    reply(&mut out, "250 directory changed").await?;
                } else {
                    reply(&mut out, "550 no such directory").await?;
                }
            }
            "SIZE" => match tree.files.get(&normalize(&cwd, &arg)) {
                Some(body) => reply(&mut out, &format!("213 {}", body.len())).await?,
                None => reply(&mut out, "550 no such file").await?,
            },
            "PASV" => {
                let data = TcpListener::bind("127.0.0.1:0").await?;
                let port = data.local_addr()?.port();
                passive = Some(data);
                let line = format!("227 Entering Passive Mode (127,0,0,1,{},{})", port >> 8, port & 0xff);
                reply(&mut out, &line).await?;
            }
            "EPSV" => {
                let data = TcpListener::bind("127.0.0.1:0").await?;
                let port = data.local_addr()?.port();
                passive = Some(data);
                reply(&mut out, &format!("229 Entering Extended Passive Mode (|||{port}|)")).await?;
            }
            "RETR" => match (tree.files.get(&normalize(&cwd, &arg)), passive.take()) {
                (Some(body), Some(data)) => {
                    reply(&mut out, "150 opening data connection").await?;
                    let (mut conn, _) = data.accept().await?;
                    conn.write_all(body).await?;
                    conn.shutdown().await?;
                    drop(conn);
                    reply(&mut out, "226 transfer complete").await?;
                }
                _ => reply(&mut out, "550 no such file").await?,
            },
            "QUIT" => {
                reply(&mut out, "221 bye").await?;
                return Ok(());
            }
            _ => reply(&mut out, "502 not implemented").await?,
        }
    }
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct ByteCounter {
    files: Mutex<Vec<String>>,
    bytes: Mutex<u64>,
}

impl ProgressSink for ByteCounter {
    fn start(&self, label: &str, _total: Option<u64>) {
        self.files.lock().unwrap().push(label.to_string());
    }

    fn advance(&self, bytes: u64) {
        *self.bytes.lock().unwrap() += bytes;
    }

    fn finish(&self) {}
}

fn transport(addr: SocketAddr, userinfo: &str) -> FtpTransport {
    let url = Url::parse(&format!("ftp://{userinfo}{addr}/tree/")).unwrap();
    FtpTransport::new(url, "anonymous", "anonymous@")
}

fn rhel_tree() -> (Vec<(&'static str, &'static [u8])>, Vec<&'static str>) {
    (
        vec![
            ("images/pxeboot/vmlinuz", b"rhel kernel".as_slice()),
            ("images/pxeboot/initrd.img", b"rhel initrd".as_slice()),
        ],
        vec!["Server"],
    )
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_marker_directory_found_by_cwd() {
    let (files, dirs) = rhel_tree();
    let addr = serve(&files, &dirs).await;
    let mut ftp = transport(addr, "");

    ftp.prepare_location().await.unwrap();
    assert!(ftp.has_file("Server").await.unwrap());
    assert!(!ftp.has_file("Client").await.unwrap());
    // still rooted at the tree after the directory check
    assert!(ftp.has_file("images/pxeboot/vmlinuz").await.unwrap());
    ftp.cleanup_location();
}

#[tokio::test]
async fn test_retrieve_reports_progress() {
    let (files, dirs) = rhel_tree();
    let addr = serve(&files, &dirs).await;
    let scratch = TempDir::new().unwrap();
    let dest = scratch.path().join("vmlinuz");
    let counter = Arc::new(ByteCounter::default());
    let progress: Arc<dyn ProgressSink> = counter.clone();

    let mut ftp = transport(addr, "");
    ftp.prepare_location().await.unwrap();
    ftp.fetch_file("images/pxeboot/vmlinuz", &dest, &progress).await.unwrap();
    ftp.cleanup_location();

    assert_eq!(std::fs::read(&dest).unwrap(), b"rhel kernel");
    assert_eq!(*counter.bytes.lock().unwrap(), "rhel kernel".len() as u64);
    assert_eq!(*counter.files.lock().unwrap(), vec!["images/pxeboot/vmlinuz".to_string()]);
}

#[tokio::test]
async fn test_missing_file_is_fetch_failed_and_session_survives() {
    let (files, dirs) = rhel_tree();
    let addr = serve(&files, &dirs).await;
    let scratch = TempDir::new().unwrap();
    let progress: Arc<dyn ProgressSink> = Arc::new(ByteCounter::default());

    let mut ftp = transport(addr, "");
    ftp.prepare_location().await.unwrap();
    let err = ftp
        .fetch_file("images/boot.iso", &scratch.path().join("boot.iso"), &progress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FetchFailed { .. }), "got {err:?}");
    assert!(ftp.has_file("Server").await.unwrap());
    ftp.cleanup_location();
}

#[tokio::test]
async fn test_failed_login_is_unavailable_and_cleanup_is_safe() {
    let (files, dirs) = rhel_tree();
    let addr = serve(&files, &dirs).await;
    let mut ftp = transport(addr, "bob:wrong@");

    let err = ftp.prepare_location().await.unwrap_err();
    assert!(matches!(err, Error::LocationUnavailable { .. }), "got {err:?}");

    ftp.cleanup_location();
    ftp.cleanup_location();
    assert!(ftp.has_file("Server").await.is_err());
}

#[tokio::test]
async fn test_lost_working_directory_closes_session() {
    let addr = serve(&[("Fedora", b"".as_slice())], &["locked"]).await;
    let mut ftp = transport(addr, "");
    ftp.prepare_location().await.unwrap();

    let err = ftp.has_file("locked").await.unwrap_err();
    assert!(matches!(err, Error::FetchFailed { .. }));
    // the session is gone rather than looking in the wrong directory
    assert!(ftp.has_file("Fedora").await.is_err());
    ftp.cleanup_location();
}

#[tokio::test]
async fn test_rhel_kernel_over_ftp() {
    let (files, dirs) = rhel_tree();
    let addr = serve(&files, &dirs).await;
    let scratch = TempDir::new().unwrap();
    let counter = Arc::new(ByteCounter::default());
    let options = AcquireOptions::default()
        .with_scratch_dir(scratch.path())
        .with_progress(counter.clone())
        .with_hints(AcquireHints {
            arch: Some("x86_64".into()),
            ..AcquireHints::default()
        });
    let base = format!("ftp://{addr}/tree/");

    let images = acquire_kernel(&base, &options).await.unwrap();
    assert_eq!(std::fs::read(&images.kernel).unwrap(), b"rhel kernel");
    assert_eq!(std::fs::read(&images.initrd).unwrap(), b"rhel initrd");
    assert_eq!(images.args, format!("method={base}"));
    assert_eq!(
        *counter.bytes.lock().unwrap(),
        ("rhel kernel".len() + "rhel initrd".len()) as u64
    );

    images.remove();
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}
