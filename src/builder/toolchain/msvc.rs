//! MSVC toolchain implementation.

use std::path::{Path, PathBuf};

use crate::core::target::Platform;

use super::{
    ArchiveInput, CodegenOptions, CommandSpec, CompileInput, Language, LinkInput, PchRole,
    Toolchain, ToolchainPlatform,
};

/// MSVC toolchain (Windows).
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    /// Path to cl.exe (compiler)
    pub cl: PathBuf,
    /// Path to lib.exe (librarian)
    pub lib: PathBuf,
    /// Path to link.exe (linker)
    pub link: PathBuf,
}

impl MsvcToolchain {
    /// Create a new MSVC toolchain.
    pub fn new(cl: PathBuf, lib: PathBuf, link: PathBuf) -> Self {
        MsvcToolchain { cl, lib, link }
    }

    fn link_common(&self, mut cmd: CommandSpec, input: &LinkInput, opts: &CodegenOptions) -> CommandSpec {
        if opts.mode.is_debug() {
            cmd = cmd.arg("/DEBUG");
        }

        match opts.platform {
            Some(Platform::X86) => cmd = cmd.arg("/MACHINE:X86"),
            Some(Platform::X64) => cmd = cmd.arg("/MACHINE:X64"),
            None => {}
        }

        cmd = cmd.arg(format!("/OUT:{}", input.output.display()));

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("/LIBPATH:{}", dir.display()));
        }

        for lib in &input.lib_files {
            cmd = cmd.arg(lib.display().to_string());
        }

        for lib in &input.libs {
            if Path::new(lib).extension().is_some() {
                cmd = cmd.arg(lib.clone());
            } else {
                cmd = cmd.arg(format!("{}.lib", lib));
            }
        }

        cmd.args(input.ldflags.iter().cloned())
    }
}

impl Toolchain for MsvcToolchain {
    fn platform(&self) -> ToolchainPlatform {
        ToolchainPlatform::Msvc
    }

    fn compiler_path(&self) -> &Path {
        &self.cl
    }

    fn cxx_compiler_path(&self) -> &Path {
        // MSVC uses the same cl.exe for both C and C++
        &self.cl
    }

    fn archiver_path(&self) -> &Path {
        &self.lib
    }

    fn linker_path(&self) -> &Path {
        &self.link
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cl);

        cmd = cmd.args(["/nologo", "/c", "/EHsc", "/FC", "/FS"]);

        if lang == Language::Cxx {
            cmd = cmd.arg("/TP");
        }

        if opts.mode.is_debug() {
            cmd = cmd.args(["/D_DEBUG", "/Od", "/RTC1", "/Zi"]);
        } else {
            cmd = cmd.args(["/DNDEBUG", "/Ox"]);
        }

        if opts.platform == Some(Platform::X86) {
            cmd = cmd.arg("/arch:SSE2");
        }

        cmd = cmd.arg(opts.crt.msvc_flag(opts.mode));

        cmd = cmd.arg(format!("/W{}", opts.warning_level));
        if opts.warnings_as_errors {
            cmd = cmd.arg("/WX");
        }
        for warning in &opts.disabled_warnings {
            cmd = cmd.arg(format!("/wd{}", warning));
        }

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("/D{}={}", name, v)),
                None => cmd = cmd.arg(format!("/D{}", name)),
            }
        }

        if let Some(pch) = &input.pch {
            let header = pch.header.display();
            match pch.role {
                // Must match the #include text in the creating source
                PchRole::Create => {
                    let name = pch.header.file_name().unwrap_or(pch.header.as_os_str());
                    cmd = cmd.arg(format!("/Yc{}", Path::new(name).display()));
                }
                PchRole::Use => {
                    cmd = cmd.arg(format!("/Yu{}", header));
                    cmd = cmd.arg(format!("/FI{}", header));
                }
            }
            cmd = cmd.arg(format!("/Fp{}", pch.artifact.display()));
        }

        cmd = cmd.args(input.cflags.iter().cloned());

        cmd = cmd.arg(input.source.display().to_string());
        cmd = cmd.arg(format!("/Fo{}", input.output.display()));

        cmd
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.lib);

        cmd = cmd.arg("/nologo");
        cmd = cmd.arg(format!("/OUT:{}", input.output.display()));

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        cmd
    }

    fn link_shared_command(
        &self,
        input: &LinkInput,
        _driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let cmd = CommandSpec::new(&self.link).args(["/nologo", "/DLL"]);
        let implib = self.import_library(&input.output);
        self.link_common(cmd, input, opts)
            .arg(format!("/IMPLIB:{}", implib.display()))
    }

    fn link_exe_command(
        &self,
        input: &LinkInput,
        _driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let cmd = CommandSpec::new(&self.link).arg("/nologo");
        self.link_common(cmd, input, opts)
    }

    fn import_library(&self, output: &Path) -> PathBuf {
        output.with_extension("lib")
    }

    fn pch_file_name(&self, _header: &Path) -> String {
        "PrecompiledHeader.pch".to_string()
    }

    fn object_extension(&self) -> &str {
        "obj"
    }

    fn static_lib_extension(&self) -> &str {
        "lib"
    }

    fn shared_lib_extension(&self) -> &str {
        "dll"
    }

    fn exe_extension(&self) -> &str {
        "exe"
    }

    fn static_lib_prefix(&self) -> &str {
        ""
    }

    fn shared_lib_prefix(&self) -> &str {
        ""
    }
}
