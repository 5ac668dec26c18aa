// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: package root
fn packages_arg() -> Arg {
    Arg::new("packages")
        .long("packages")
        .value_name("DIR")
        .required(true)
        .help("Directory tree holding one recipe.toml per package")
}

fn build_cli() -> Command {
    Command::new("crossbake")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Crossbake Contributors")
        .about("Cross-build Python wheels inside an activated SDK shell")
        .subcommand_required(true)
        .subcommand(
            Command::new("cook")
                .about("Build every package under a package root")
                .arg(packages_arg())
                .arg(
                    Arg::new("sdk")
                        .long("sdk")
                        .value_name("DIR")
                        .required(true)
                        .help("Cross SDK directory containing the activation script"),
                )
                .arg(
                    Arg::new("build_root")
                        .long("build-root")
                        .default_value("build")
                        .help("Scratch root for per-package build trees"),
                )
                .arg(
                    Arg::new("dist_root")
                        .long("dist-root")
                        .default_value("dist")
                        .help("Output root for built wheels"),
                )
                .arg(Arg::new("jobs").short('j').long("jobs").help("Number of packages to build in parallel"))
                .arg(Arg::new("timeout").long("timeout").help("Per-command timeout in seconds"))
                .arg(Arg::new("config").short('c').long("config").help("Target and kitchen configuration file"))
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::SetTrue)
                        .help("Stream every build output line"),
                )
                .arg(
                    Arg::new("only")
                        .long("only")
                        .value_name("NAME")
                        .action(ArgAction::Append)
                        .help("Only build packages with this name or path label"),
                ),
        )
        .subcommand(
            Command::new("unpack")
                .about("Extract a source archive, refusing anything that escapes the destination")
                .arg(Arg::new("archive").required(true).help("Archive file"))
                .arg(Arg::new("destination").required(true).help("Destination directory"))
                .arg(
                    Arg::new("subpath")
                        .long("subpath")
                        .default_value(".")
                        .help("Only extract members under this path"),
                )
                .arg(
                    Arg::new("verbose")
                        .short('v')
                        .long("verbose")
                        .action(ArgAction::SetTrue)
                        .help("Log every extracted member"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Parse and validate every recipe under a package root")
                .arg(packages_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("crossbake.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
