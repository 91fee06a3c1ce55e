//! GCC/Clang toolchain implementation.

use std::path::{Path, PathBuf};

use crate::core::target::{Crt, Platform};

use super::{
    ArchiveInput, CodegenOptions, CommandSpec, CompileInput, Language, LinkInput, PchRole,
    Toolchain, ToolchainPlatform,
};

/// GCC/Clang toolchain (Unix-like systems).
#[derive(Debug, Clone)]
pub struct GccToolchain {
    /// Path to the C compiler
    pub cc: PathBuf,
    /// Path to the C++ compiler
    pub cxx: PathBuf,
    /// Path to the archiver
    pub ar: PathBuf,
    /// Compiler family (gcc, clang, apple-clang)
    pub family: ToolchainPlatform,
}

impl GccToolchain {
    /// Create a new GCC-style toolchain.
    pub fn new(cc: PathBuf, cxx: PathBuf, ar: PathBuf, family: ToolchainPlatform) -> Self {
        GccToolchain {
            cc,
            cxx,
            ar,
            family,
        }
    }

    /// Infer C++ compiler path from C compiler path.
    ///
    /// Handles common patterns:
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if cc_str.ends_with("gcc") {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 2]));
        }

        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only a complete basename counts ("mycc" is not "cc")
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");

        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn driver(&self, lang: Language) -> &Path {
        match lang {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }

    fn warning_flags(opts: &CodegenOptions) -> Vec<&'static str> {
        let mut flags = match opts.warning_level {
            0 => vec!["-w"],
            1 => vec![],
            2 => vec!["-Wall"],
            3 => vec!["-Wall", "-Wextra"],
            _ => vec!["-Wall", "-Wextra", "-Wpedantic"],
        };
        if opts.warnings_as_errors {
            flags.push("-Werror");
        }
        flags
    }

    fn arch_flag(opts: &CodegenOptions) -> Option<&'static str> {
        opts.platform.map(|p| match p {
            Platform::X86 => "-m32",
            Platform::X64 => "-m64",
        })
    }

    fn link_common(
        &self,
        mut cmd: CommandSpec,
        input: &LinkInput,
        driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        if opts.mode.is_debug() {
            cmd = cmd.arg("-g");
        }

        if let Some(flag) = Self::arch_flag(opts) {
            cmd = cmd.arg(flag);
        }

        if opts.crt == Crt::Static {
            cmd = cmd.arg("-static-libgcc");
            if driver == Language::Cxx {
                cmd = cmd.arg("-static-libstdc++");
            }
        }

        cmd = cmd.arg("-o");
        cmd = cmd.arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        for dir in &input.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }

        for lib in &input.lib_files {
            cmd = cmd.arg(lib.display().to_string());
        }

        for lib in &input.libs {
            // `-l:name.ext` asks for an exact file name
            if Path::new(lib).extension().is_some() {
                cmd = cmd.arg(format!("-l:{}", lib));
            } else {
                cmd = cmd.arg(format!("-l{}", lib));
            }
        }

        cmd.args(input.ldflags.iter().cloned())
    }
}

impl Toolchain for GccToolchain {
    fn platform(&self) -> ToolchainPlatform {
        self.family
    }

    fn compiler_path(&self) -> &Path {
        &self.cc
    }

    fn cxx_compiler_path(&self) -> &Path {
        &self.cxx
    }

    fn archiver_path(&self) -> &Path {
        &self.ar
    }

    fn linker_path(&self) -> &Path {
        &self.cxx
    }

    fn compile_command(
        &self,
        input: &CompileInput,
        lang: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let mut cmd = CommandSpec::new(self.driver(lang));

        cmd = cmd.arg("-c");

        if opts.mode.is_debug() {
            cmd = cmd.args(["-g", "-O0", "-D_DEBUG"]);
        } else {
            cmd = cmd.args(["-O2", "-DNDEBUG"]);
        }

        if let Some(flag) = Self::arch_flag(opts) {
            cmd = cmd.arg(flag);
        }

        if opts.position_independent {
            cmd = cmd.arg("-fPIC");
        }

        cmd = cmd.args(Self::warning_flags(opts));

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        for (name, value) in &input.defines {
            match value {
                Some(v) => cmd = cmd.arg(format!("-D{}={}", name, v)),
                None => cmd = cmd.arg(format!("-D{}", name)),
            }
        }

        // GCC has no separate create step for a header consumed by
        // `-include`; the creating source compiles like any other.
        if let Some(pch) = input.pch.as_ref().filter(|p| p.role == PchRole::Use) {
            cmd = cmd.arg("-include");
            cmd = cmd.arg(pch.header_file.display().to_string());
        }

        cmd = cmd.args(input.cflags.iter().cloned());

        cmd = cmd.arg(input.source.display().to_string());
        cmd = cmd.arg("-o");
        cmd = cmd.arg(input.output.display().to_string());

        cmd
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.ar);

        // Create archive with symbol index, replace files
        cmd = cmd.arg("rcs");
        cmd = cmd.arg(input.output.display().to_string());

        for obj in &input.objects {
            cmd = cmd.arg(obj.display().to_string());
        }

        cmd
    }

    fn link_shared_command(
        &self,
        input: &LinkInput,
        driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let cmd = CommandSpec::new(self.driver(driver)).arg("-shared");
        self.link_common(cmd, input, driver, opts)
    }

    fn link_exe_command(
        &self,
        input: &LinkInput,
        driver: Language,
        opts: &CodegenOptions,
    ) -> CommandSpec {
        let cmd = CommandSpec::new(self.driver(driver));
        self.link_common(cmd, input, driver, opts)
    }

    fn pch_file_name(&self, header: &Path) -> String {
        let name = header
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "PrecompiledHeader.h".to_string());
        format!("{}.gch", name)
    }

    fn object_extension(&self) -> &str {
        "o"
    }

    fn static_lib_extension(&self) -> &str {
        "a"
    }

    fn shared_lib_extension(&self) -> &str {
        if cfg!(target_os = "macos") {
            "dylib"
        } else {
            "so"
        }
    }

    fn exe_extension(&self) -> &str {
        ""
    }

    fn static_lib_prefix(&self) -> &str {
        "lib"
    }

    fn shared_lib_prefix(&self) -> &str {
        "lib"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::PchUsage;
    use crate::core::target::BuildMode;

    fn gcc() -> GccToolchain {
        GccToolchain::new(
            PathBuf::from("gcc"),
            PathBuf::from("g++"),
            PathBuf::from("ar"),
            ToolchainPlatform::Gcc,
        )
    }

    fn compile_input(source: &str) -> CompileInput {
        CompileInput {
            source: PathBuf::from(source),
            output: PathBuf::from("obj/main.o"),
            include_dirs: vec![PathBuf::from("/usr/include")],
            defines: vec![
                ("DEBUG".to_string(), None),
                ("VERSION".to_string(), Some("1".to_string())),
            ],
            cflags: vec!["-march=native".to_string()],
            pch: None,
        }
    }

    #[test]
    fn test_infer_cxx() {
        assert_eq!(GccToolchain::infer_cxx(Path::new("gcc")), PathBuf::from("g++"));
        assert_eq!(
            GccToolchain::infer_cxx(Path::new("/usr/bin/clang")),
            PathBuf::from("/usr/bin/clang++")
        );
        assert_eq!(GccToolchain::infer_cxx(Path::new("cc")), PathBuf::from("c++"));
    }

    #[test]
    fn test_gcc_compile_command() {
        let cmd = gcc().compile_command(
            &compile_input("src/main.c"),
            Language::C,
            &CodegenOptions::default(),
        );

        assert_eq!(cmd.program, PathBuf::from("gcc"));
        assert_eq!(cmd.args[0], "-c");
        assert!(cmd.args.contains(&"-O2".to_string()));
        assert!(cmd.args.contains(&"-DNDEBUG".to_string()));
        assert!(cmd.args.contains(&"-Wextra".to_string()));
        assert!(cmd.args.contains(&"-I/usr/include".to_string()));
        assert!(cmd.args.contains(&"-DDEBUG".to_string()));
        assert!(cmd.args.contains(&"-DVERSION=1".to_string()));
        assert!(cmd.args.contains(&"-march=native".to_string()));
        assert_eq!(cmd.args[cmd.args.len() - 2..], ["-o", "obj/main.o"]);
    }

    #[test]
    fn test_gcc_debug_warnings_and_pic() {
        let opts = CodegenOptions {
            mode: BuildMode::Debug,
            warning_level: 0,
            warnings_as_errors: true,
            position_independent: true,
            ..CodegenOptions::default()
        };
        let cmd = gcc().compile_command(&compile_input("src/main.cpp"), Language::Cxx, &opts);

        assert_eq!(cmd.program, PathBuf::from("g++"));
        assert!(cmd.args.contains(&"-O0".to_string()));
        assert!(cmd.args.contains(&"-g".to_string()));
        assert!(cmd.args.contains(&"-w".to_string()));
        assert!(cmd.args.contains(&"-Werror".to_string()));
        assert!(cmd.args.contains(&"-fPIC".to_string()));
    }

    #[test]
    fn test_gcc_platform_selects_word_size() {
        let opts = CodegenOptions {
            platform: Some(Platform::X86),
            ..CodegenOptions::default()
        };
        let compile = gcc().compile_command(&compile_input("src/main.c"), Language::C, &opts);
        assert!(compile.args.contains(&"-m32".to_string()));

        let input = LinkInput {
            objects: vec![PathBuf::from("obj/main.o")],
            output: PathBuf::from("out/app"),
            lib_dirs: vec![],
            lib_files: vec![],
            libs: vec![],
            ldflags: vec![],
        };
        let link = gcc().link_exe_command(&input, Language::C, &opts);
        assert!(link.args.contains(&"-m32".to_string()));

        let native = gcc().compile_command(
            &compile_input("src/main.c"),
            Language::C,
            &CodegenOptions::default(),
        );
        assert!(!native.args.iter().any(|a| a == "-m32" || a == "-m64"));
    }

    #[test]
    fn test_gcc_pch_use_force_includes_header() {
        let mut input = compile_input("src/main.cpp");
        input.pch = Some(PchUsage {
            header: PathBuf::from("stdafx.h"),
            header_file: PathBuf::from("/p/src/stdafx.h"),
            artifact: PathBuf::from("obj/stdafx.h.gch"),
            role: PchRole::Use,
        });

        let cmd = gcc().compile_command(&input, Language::Cxx, &CodegenOptions::default());
        let pos = cmd.args.iter().position(|a| a == "-include").unwrap();
        assert_eq!(cmd.args[pos + 1], "/p/src/stdafx.h");
    }

    #[test]
    fn test_gcc_archive_command() {
        let input = ArchiveInput {
            objects: vec![PathBuf::from("obj/a.o"), PathBuf::from("obj/b.o")],
            output: PathBuf::from("lib/libfoo.a"),
        };

        let cmd = gcc().archive_command(&input);
        assert_eq!(cmd.program, PathBuf::from("ar"));
        assert_eq!(cmd.args, vec!["rcs", "lib/libfoo.a", "obj/a.o", "obj/b.o"]);
    }

    #[test]
    fn test_gcc_link_command() {
        let input = LinkInput {
            objects: vec![PathBuf::from("obj/main.o")],
            output: PathBuf::from("out/app"),
            lib_dirs: vec![PathBuf::from("libs")],
            lib_files: vec![PathBuf::from("out/libcore.a")],
            libs: vec!["m".to_string(), "foo.so".to_string()],
            ldflags: vec!["-rdynamic".to_string()],
        };
        let opts = CodegenOptions {
            crt: Crt::Static,
            ..CodegenOptions::default()
        };

        let cmd = gcc().link_exe_command(&input, Language::Cxx, &opts);
        assert_eq!(cmd.program, PathBuf::from("g++"));
        assert!(cmd.args.contains(&"-static-libstdc++".to_string()));
        assert!(cmd.args.contains(&"-Llibs".to_string()));
        assert!(cmd.args.contains(&"out/libcore.a".to_string()));
        assert!(cmd.args.contains(&"-lm".to_string()));
        assert!(cmd.args.contains(&"-l:foo.so".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "-rdynamic");

        let shared = gcc().link_shared_command(&input, Language::C, &CodegenOptions::default());
        assert_eq!(shared.program, PathBuf::from("gcc"));
        assert_eq!(shared.args[0], "-shared");
    }
}
