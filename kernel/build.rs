use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

/// Directory whose files are embedded into the kernel as program images.
const PROGRAMS_VAR: &str = "KSPACE_PROGRAMS";

fn tool_version(tool: &str) -> String {
    Command::new(tool)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|v| v.trim().to_owned())
        .unwrap_or_else(|| format!("{} (unknown version)", tool))
}

fn program_images(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot read {} ({}): {}", PROGRAMS_VAR, dir.display(), e));
    let mut images: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_owned();
            let path = path.canonicalize().ok()?;
            Some((name, path))
        })
        .collect();
    images.sort();
    images
}

fn write_programs(out_dir: &Path) -> std::io::Result<()> {
    let images = match env::var_os(PROGRAMS_VAR) {
        Some(dir) => {
            println!("cargo:rerun-if-changed={}", Path::new(&dir).display());
            program_images(Path::new(&dir))
        }
        None => Vec::new(),
    };

    let mut out = fs::File::create(out_dir.join("programs.rs"))?;
    writeln!(out, "pub static PROGRAMS: &[(&str, &[u8])] = &[")?;
    for (name, path) in &images {
        println!("cargo:rerun-if-changed={}", path.display());
        writeln!(out, "    ({:?}, include_bytes!({:?})),", name, path)?;
    }
    writeln!(out, "];")?;
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={}", PROGRAMS_VAR);

    println!(
        "cargo:rustc-env=BUILD_TARGET={}",
        env::var("TARGET").unwrap_or_default()
    );
    println!(
        "cargo:rustc-env=BUILD_DATE={}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "cargo:rustc-env=PROFILE={}",
        env::var("PROFILE").unwrap_or_default()
    );
    println!("cargo:rustc-env=CARGO_VERSION={}", tool_version("cargo"));
    println!("cargo:rustc-env=RUSTC_VERSION={}", tool_version("rustc"));

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("cargo sets OUT_DIR"));
    write_programs(&out_dir).expect("failed to write the program table");
}
