//! Capability probe for the compiler bridge.
//!
//! Opens both providers with the given overrides and reports every catalog
//! symbol, so a host can check a toolchain install before loading the shim.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use paravirt_compiler::core::{BridgeConfig, ConstructorAbi};
use paravirt_compiler::symbols::{DynamicLibrary, Provider, ProviderGroup};

#[derive(Parser, Debug)]
#[command(name = "paravirt-probe", about = "Report which compiler services the host provides")]
struct Args {
    /// Path to the IR services library (libLLVM)
    #[arg(long)]
    llvm: Option<PathBuf>,

    /// Path to the GPU compiler services library (libGPUCompiler)
    #[arg(long = "gpu-compiler")]
    gpu_compiler: Option<PathBuf>,

    /// Constructor ABI to report: legacy or versioned
    #[arg(long)]
    abi: Option<ConstructorAbi>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = args.llvm {
        config.llvm_library = path;
    }
    if let Some(path) = args.gpu_compiler {
        config.gpu_compiler_library = path;
    }
    if let Some(abi) = args.abi {
        config.constructor_abi = abi;
    }

    let mut complete = true;
    for (provider, path) in [
        (Provider::Ir, &config.llvm_library),
        (Provider::GpuCompiler, &config.gpu_compiler_library),
    ] {
        let library = match DynamicLibrary::open(provider, path) {
            Ok(library) => library,
            Err(e) => {
                eprintln!("Error: {}", e);
                complete = false;
                continue;
            }
        };

        let group = ProviderGroup::bind(provider, Box::new(library));
        println!("{} ({})", provider, group.origin());
        for entry in group.entries() {
            println!(
                "  {:<28} {:<52} {}{}",
                entry.spec.capability,
                entry.name(),
                if entry.found() { "found" } else { "missing" },
                if entry.required() { " [required]" } else { "" }
            );
        }
        complete &= group.missing_required().is_empty();
    }

    println!("constructor ABI: {}", config.constructor_abi);
    if complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
