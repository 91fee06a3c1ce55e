//! Toolchain detection functions.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use which::which;

use crate::core::target::ToolchainKind;
use crate::util::config::ToolchainSettings;
use crate::util::diagnostic::suggestions;

use super::{GccToolchain, MsvcToolchain, Toolchain, ToolchainPlatform};

/// Detect the available toolchain.
///
/// Tries to find a C compiler and related tools with the following priority:
/// 1. `[toolchain]` config settings
/// 2. Environment variables (CC, CXX, AR)
/// 3. On Windows with MSVC: cl.exe, lib.exe, link.exe from a developer prompt
/// 4. On Unix-like systems: cc/gcc/clang, plus ar
///
/// When the build script names a toolchain `kind`, only that family is
/// searched for, and an explicitly configured compiler must belong to it.
pub fn detect_toolchain(
    settings: &ToolchainSettings,
    kind: Option<ToolchainKind>,
) -> Result<Box<dyn Toolchain>> {
    detect_with_env(settings, kind, |key| std::env::var(key).ok())
}

fn detect_with_env(
    settings: &ToolchainSettings,
    kind: Option<ToolchainKind>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn Toolchain>> {
    let env_path = |key: &str| env(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    if settings.has_overrides() {
        tracing::debug!("Using toolchain paths from config");
    }

    let cc = settings.cc.clone().or_else(|| env_path("CC"));
    if let Some(cc) = cc {
        let cxx = settings.cxx.clone().or_else(|| env_path("CXX"));
        let ar = settings.ar.clone().or_else(|| env_path("AR"));
        let toolchain = from_compiler(cc, cxx, ar, settings.link.clone())?;
        if let Some(kind) = kind {
            if !belongs_to(toolchain.platform(), kind) {
                bail!(
                    "build script requires the {} toolchain, but the configured compiler {} is {}",
                    kind,
                    toolchain.compiler_path().display(),
                    toolchain.platform().as_str()
                );
            }
        }
        return Ok(toolchain);
    }

    let (cc_names, cxx_names): (&[&str], &[&str]) = match kind {
        Some(ToolchainKind::Msvc) => {
            return try_detect_msvc()?.ok_or_else(|| {
                anyhow!(
                    "build script requires the msvc toolchain, but no developer command prompt environment was found\n{}",
                    suggestions::NO_TOOLCHAIN
                )
            });
        }
        Some(ToolchainKind::Gcc) => (&["gcc"][..], &["g++"][..]),
        Some(ToolchainKind::Clang) => (&["clang"][..], &["clang++"][..]),
        None => {
            if let Some(toolchain) = try_detect_msvc()? {
                return Ok(toolchain);
            }
            (&["cc", "gcc", "clang"][..], &["c++", "g++", "clang++"][..])
        }
    };

    if let Some(toolchain) = try_detect_gcc(cc_names, cxx_names, env_path("CXX"), env_path("AR"))? {
        return Ok(toolchain);
    }

    if let Some(kind) = kind {
        bail!(
            "build script requires the {} toolchain, but `{}` was not found in PATH\n{}",
            kind,
            cc_names.join("`, `"),
            suggestions::NO_TOOLCHAIN
        );
    }

    bail!(
        "no C compiler found\n\
         \n\
         fbuild requires a C/C++ compiler (gcc, clang, or cl).\n\
         {}",
        suggestions::NO_TOOLCHAIN
    )
}

/// Build a toolchain around an explicitly chosen compiler.
///
/// The compiler is trusted as given; a wrong path surfaces as a spawn
/// error on the first compile.
fn from_compiler(
    cc: PathBuf,
    cxx: Option<PathBuf>,
    ar: Option<PathBuf>,
    link: Option<PathBuf>,
) -> Result<Box<dyn Toolchain>> {
    if is_msvc_driver(&cc) {
        let sibling = |name: &str| match cc.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        let lib = ar.unwrap_or_else(|| sibling("lib.exe"));
        let link = link.unwrap_or_else(|| sibling("link.exe"));
        tracing::debug!("Using MSVC toolchain: cl={}", cc.display());
        return Ok(Box::new(MsvcToolchain::new(cc, lib, link)));
    }

    let cxx = cxx.unwrap_or_else(|| GccToolchain::infer_cxx(&cc));
    let ar = match ar {
        Some(ar) => ar,
        None => match which("ar").or_else(|_| which("llvm-ar")) {
            Ok(p) => p,
            Err(_) => bail!(
                "archiver (ar) not found for compiler {}\n{}",
                cc.display(),
                suggestions::NO_TOOLCHAIN
            ),
        },
    };

    let family = detect_compiler_family(&cc);
    tracing::debug!(
        "Using {} toolchain: cc={}, cxx={}, ar={}",
        family.as_str(),
        cc.display(),
        cxx.display(),
        ar.display()
    );

    Ok(Box::new(GccToolchain::new(cc, cxx, ar, family)))
}

fn belongs_to(platform: ToolchainPlatform, kind: ToolchainKind) -> bool {
    match kind {
        ToolchainKind::Gcc => platform == ToolchainPlatform::Gcc,
        ToolchainKind::Clang => matches!(
            platform,
            ToolchainPlatform::Clang | ToolchainPlatform::AppleClang
        ),
        ToolchainKind::Msvc => platform == ToolchainPlatform::Msvc,
    }
}

fn is_msvc_driver(cc: &Path) -> bool {
    cc.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("cl"))
        .unwrap_or(false)
}

/// Try to detect MSVC from a Developer Command Prompt environment.
#[cfg(target_os = "windows")]
fn try_detect_msvc() -> Result<Option<Box<dyn Toolchain>>> {
    let Ok(cl) = which("cl") else {
        return Ok(None);
    };
    if std::env::var("INCLUDE").is_err() || std::env::var("LIB").is_err() {
        tracing::debug!("cl.exe found but INCLUDE/LIB are not set; skipping MSVC");
        return Ok(None);
    }

    let lib = which("lib")
        .map_err(|_| anyhow::anyhow!("MSVC cl.exe found but lib.exe not in PATH"))?;
    let link = which("link")
        .map_err(|_| anyhow::anyhow!("MSVC cl.exe found but link.exe not in PATH"))?;
    Ok(Some(Box::new(MsvcToolchain::new(cl, lib, link))))
}

#[cfg(not(target_os = "windows"))]
fn try_detect_msvc() -> Result<Option<Box<dyn Toolchain>>> {
    Ok(None)
}

/// Try to detect a GCC/Clang toolchain on PATH, taking the first of
/// `cc_names` that exists.
fn try_detect_gcc(
    cc_names: &[&str],
    cxx_names: &[&str],
    cxx: Option<PathBuf>,
    ar: Option<PathBuf>,
) -> Result<Option<Box<dyn Toolchain>>> {
    let Some(cc) = cc_names.iter().find_map(|name| which(name).ok()) else {
        return Ok(None);
    };

    let cxx = cxx.or_else(|| cxx_names.iter().find_map(|name| which(name).ok()));

    let ar = match ar.or_else(|| which("ar").ok()) {
        Some(ar) => ar,
        None => return Ok(None),
    };

    from_compiler(cc, cxx, Some(ar), None).map(Some)
}

/// Detect whether the compiler is GCC, Clang, or Apple Clang.
fn detect_compiler_family(cc: &Path) -> ToolchainPlatform {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("clang") {
        return detect_clang_variant(cc);
    } else if name.contains("gcc") || name.contains("g++") {
        return ToolchainPlatform::Gcc;
    }

    if let Some(version) = version_output(cc) {
        if version.contains("clang") {
            return if version.contains("apple") {
                ToolchainPlatform::AppleClang
            } else {
                ToolchainPlatform::Clang
            };
        }
    }

    ToolchainPlatform::Gcc
}

/// Detect if Clang is Apple Clang or regular Clang.
fn detect_clang_variant(cc: &Path) -> ToolchainPlatform {
    match version_output(cc) {
        Some(version) if version.contains("apple") => ToolchainPlatform::AppleClang,
        _ => ToolchainPlatform::Clang,
    }
}

fn version_output(cc: &Path) -> Option<String> {
    let output = std::process::Command::new(cc)
        .arg("--version")
        .output()
        .ok()?;
    Some(String::from_utf8_lossy(&output.stdout).to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_compiler_is_trusted() {
        let tc = detect_with_env(
            &ToolchainSettings::default(),
            None,
            env_of(&[("CC", "gcc"), ("AR", "ar")]),
        )
        .unwrap();

        assert_eq!(tc.platform(), ToolchainPlatform::Gcc);
        assert_eq!(tc.compiler_path(), Path::new("gcc"));
        assert_eq!(tc.cxx_compiler_path(), Path::new("g++"));
        assert_eq!(tc.archiver_path(), Path::new("ar"));
    }

    #[test]
    fn test_config_beats_env() {
        let settings = ToolchainSettings {
            cc: Some(PathBuf::from("/opt/gcc-13/bin/gcc")),
            cxx: Some(PathBuf::from("/opt/gcc-13/bin/g++")),
            ar: Some(PathBuf::from("/opt/gcc-13/bin/gcc-ar")),
            ..ToolchainSettings::default()
        };
        let tc = detect_with_env(&settings, None, env_of(&[("CC", "clang")])).unwrap();

        assert_eq!(tc.compiler_path(), Path::new("/opt/gcc-13/bin/gcc"));
        assert_eq!(tc.archiver_path(), Path::new("/opt/gcc-13/bin/gcc-ar"));
    }

    #[test]
    fn test_cl_selects_msvc() {
        let settings = ToolchainSettings {
            cc: Some(PathBuf::from("C:/VC/bin/cl.exe")),
            ..ToolchainSettings::default()
        };
        let tc = detect_with_env(&settings, Some(ToolchainKind::Msvc), env_of(&[])).unwrap();

        assert_eq!(tc.platform(), ToolchainPlatform::Msvc);
        assert_eq!(tc.archiver_path(), Path::new("C:/VC/bin/lib.exe"));
        assert_eq!(tc.linker_path(), Path::new("C:/VC/bin/link.exe"));
    }

    #[test]
    fn test_script_toolchain_must_match_configured_compiler() {
        let env = env_of(&[("CC", "gcc"), ("AR", "ar")]);

        let tc = detect_with_env(&ToolchainSettings::default(), Some(ToolchainKind::Gcc), &env).unwrap();
        assert_eq!(tc.platform(), ToolchainPlatform::Gcc);

        let err = detect_with_env(&ToolchainSettings::default(), Some(ToolchainKind::Msvc), &env)
            .err()
            .unwrap();
        let msg = err.to_string();
        assert!(msg.contains("requires the msvc toolchain"));
        assert!(msg.contains("gcc"));
    }

    #[test]
    fn test_family_membership() {
        assert!(belongs_to(ToolchainPlatform::AppleClang, ToolchainKind::Clang));
        assert!(!belongs_to(ToolchainPlatform::Clang, ToolchainKind::Gcc));
        assert!(belongs_to(ToolchainPlatform::Msvc, ToolchainKind::Msvc));
    }
}
