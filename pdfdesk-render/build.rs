use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::{AgentBuilder, Error as UreqError};
use walkdir::WalkDir;

const DEFAULT_PDFIUM_VERSION: &str = "7350";
const DEFAULT_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

// Fetching Pdfium is opt-in. Without PDFDESK_PDFIUM_DOWNLOAD or an archive
// path the crate binds to a library at runtime (working directory, then the
// system search path).
fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for var in [
        "PDFDESK_PDFIUM_DOWNLOAD",
        "PDFDESK_PDFIUM_ARCHIVE_PATH",
        "PDFDESK_PDFIUM_VERSION",
        "PDFDESK_PDFIUM_PLATFORM",
        "PDFDESK_PDFIUM_BASE_URL",
        "PDFIUM_DYNAMIC_LIB_PATH",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    if env::var_os("CARGO_FEATURE_PDF").is_none() {
        return;
    }
    if let Some(dir) = env::var_os("PDFIUM_DYNAMIC_LIB_PATH") {
        let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
        match locate_library(Path::new(&dir), &target_os) {
            Ok(path) => emit_library_path(&path),
            Err(err) => println!("cargo:warning={err:#}"),
        }
        return;
    }
    let wants_download = env::var_os("PDFDESK_PDFIUM_DOWNLOAD").is_some();
    let archive = env::var_os("PDFDESK_PDFIUM_ARCHIVE_PATH").map(PathBuf::from);
    if !wants_download && archive.is_none() {
        return;
    }

    if let Err(err) = stage_pdfium(archive) {
        println!("cargo:warning=Pdfium was not staged, falling back to runtime lookup: {err:#}");
    }
}

fn stage_pdfium(archive: Option<PathBuf>) -> Result<()> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR env var not set")?);
    let staging_dir = out_dir.join("pdfium");
    fs::create_dir_all(&staging_dir).context("failed to create staging directory")?;

    let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS missing")?;
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH missing")?;

    if let Ok(path) = locate_library(&staging_dir, &target_os) {
        emit_library_path(&path);
        return Ok(());
    }

    let archive = match archive {
        Some(path) => path,
        None => {
            let platform = env::var("PDFDESK_PDFIUM_PLATFORM")
                .unwrap_or_else(|_| platform_name(&target_os, &target_arch));
            download(&staging_dir, &platform)?
        }
    };

    let file = File::open(&archive).with_context(|| format!("failed to open {:?}", archive))?;
    Archive::new(GzDecoder::new(file))
        .unpack(&staging_dir)
        .with_context(|| format!("failed to unpack {:?}", archive))?;

    let library = locate_library(&staging_dir, &target_os)?;
    emit_library_path(&library);
    Ok(())
}

fn emit_library_path(path: &Path) {
    println!("cargo:rustc-env=PDFDESK_PDFIUM_LIBRARY_PATH={}", path.display());
}

fn platform_name(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        "windows" => "win",
        other => other,
    };
    let arch = match target_arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x86",
        other => other,
    };
    format!("{os}-{arch}")
}

fn locate_library(root: &Path, target_os: &str) -> Result<PathBuf> {
    let wanted = match target_os {
        "windows" => "pdfium.dll",
        "macos" => "libpdfium.dylib",
        _ => "libpdfium.so",
    };
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == wanted)
        .map(|entry| entry.into_path())
        .ok_or_else(|| anyhow!("{wanted} not found under {:?}", root))
}

fn download(staging_dir: &Path, platform: &str) -> Result<PathBuf> {
    let version =
        env::var("PDFDESK_PDFIUM_VERSION").unwrap_or_else(|_| DEFAULT_PDFIUM_VERSION.to_string());
    let base_url =
        env::var("PDFDESK_PDFIUM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let filename = format!("pdfium-{platform}.tgz");
    let destination = staging_dir.join(&filename);
    if destination.exists() {
        return Ok(destination);
    }

    let url = format!(
        "{}/chromium/{}/{}",
        base_url.trim_end_matches('/'),
        version,
        filename
    );
    let agent = AgentBuilder::new()
        .timeout_read(Duration::from_secs(120))
        .build();
    let response = match agent.get(&url).call() {
        Ok(response) => response,
        Err(UreqError::Status(code, _)) => return Err(anyhow!("GET {url} returned HTTP {code}")),
        Err(err) => return Err(anyhow!("GET {url} failed: {err}")),
    };

    let partial = destination.with_extension("part");
    let mut file =
        File::create(&partial).with_context(|| format!("failed to create {:?}", partial))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to write {:?}", partial))?;
    fs::rename(&partial, &destination)?;
    Ok(destination)
}
