//! `cwerg-be`: the thin CLI driver around the library's two entry
//! points. `lint <input>` runs the textual parser's
//! structural checks only; `assemble <isa> <input> <output>` runs the
//! full parser → ELF writer pipeline. `-` means stdin/stdout.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::str::FromStr;

use cwerg_codegen::elf::{parser, writer};
use cwerg_codegen::isa::Isa;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("cwerg-be: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    match args {
        [cmd, input] if cmd == "lint" => cmd_lint(input),
        [cmd, isa, input, output] if cmd == "assemble" => cmd_assemble(isa, input, output),
        _ => Err(format!(
            "usage: cwerg-be lint <input> | cwerg-be assemble <isa> <input> <output>\n\
             got: {}",
            args.join(" ")
        )),
    }
}

fn cmd_lint(input_path: &str) -> Result<(), String> {
    let input = read_input(input_path)?;
    parser::lint(&input).map_err(|e| e.to_string())
}

fn cmd_assemble(isa_name: &str, input_path: &str, output_path: &str) -> Result<(), String> {
    let isa = Isa::from_str(isa_name)
        .map_err(|_| format!("unknown ISA `{}` (expected aarch32, aarch64, or x86_64)", isa_name))?;
    let input = read_input(input_path)?;
    let unit = parser::parse(isa, &input).map_err(|e| e.to_string())?;
    let bytes = writer::link_and_write(&unit).map_err(|e| e.to_string())?;
    write_output(output_path, &bytes)
}

fn read_input(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("reading stdin: {}", e))?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(|e| format!("reading `{}`: {}", path, e))
    }
}

fn write_output(path: &str, bytes: &[u8]) -> Result<(), String> {
    if path == "-" {
        return io::stdout()
            .write_all(bytes)
            .map_err(|e| format!("writing stdout: {}", e));
    }
    fs::write(path, bytes).map_err(|e| format!("writing `{}`: {}", path, e))?;
    set_executable(path).map_err(|e| format!("setting permissions on `{}`: {}", path, e))
}

#[cfg(unix)]
fn set_executable(path: &str) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &str) -> io::Result<()> {
    Ok(())
}
