use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::version::{number, version};

const TPM_ROOT_CERT_DIR: &str = "root-certs/tpm";

fn visit(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            visit(&path, files);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| !n.starts_with('.'))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
}

fn embed_tpm_root_certs() {
    println!("cargo:rerun-if-changed={TPM_ROOT_CERT_DIR}");

    let base = Path::new(TPM_ROOT_CERT_DIR);
    let mut files = Vec::new();
    if base.is_dir() {
        visit(base, &mut files);
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is not set");
    let out_path = Path::new(&out_dir).join("tpm_root_certs.rs");
    let mut out = fs::File::create(&out_path).expect("unable to create tpm_root_certs.rs");

    writeln!(
        out,
        "pub(crate) static TPM_ROOT_CERT_FILES: &[(&str, &[u8])] = &["
    )
    .expect("unable to write tpm_root_certs.rs");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is not set");
    for path in files {
        let rel = path.strip_prefix(base).expect("path is under the cert dir");
        // The store tag is the leading path segment under the cert dir.
        let tag = rel
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .expect("cert path has no leading segment");
        let abs = Path::new(&manifest_dir).join(&path);
        writeln!(
            out,
            "    ({:?}, include_bytes!({:?})),",
            tag,
            abs.display().to_string()
        )
        .expect("unable to write tpm_root_certs.rs");
    }

    writeln!(out, "];").expect("unable to write tpm_root_certs.rs");
}

fn main() {
    // Signature verification here leans on OpenSSL 3 behaviour; refuse to
    // build against the 1.x series. LibreSSL reports itself as v2.
    #[allow(clippy::unusual_byte_groupings)]
    if number() < 0x2_00_00_00_0 {
        println!(
            r#"
webauthn-attest-core requires OpenSSL v3.0.0 or later to build.

The linked OpenSSL reports: {}

See the README of this crate for the supported cryptographic providers.
"#,
            version(),
        );
        panic!("The installed version of OpenSSL is too old for webauthn-attest-core.");
    }

    embed_tpm_root_certs();
}
