//! `una info`: Display the detected process and its conventions.

use crate::config::UnaConfig;
use una::{ConventionAttr, Endian, WordSize};

pub fn execute(config: &UnaConfig) -> anyhow::Result<()> {
    println!("UNA v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let ctx = super::resolve_context(config, None)?;
    let bits = match ctx.word_size() {
        WordSize::W32 => 32,
        WordSize::W64 => 64,
    };
    let endian = match ctx.endian() {
        Endian::Little => "little",
        Endian::Big => "big",
    };
    println!("Arch/OS:      {}", ctx.arch_os());
    println!("Word size:    {}-bit", bits);
    println!("Byte order:   {}-endian", endian);
    println!();

    println!("Conventions:");
    for (name, attr) in [
        ("default", ConventionAttr::Default),
        ("stdcall", ConventionAttr::Stdcall),
        ("stdcall-on-windows", ConventionAttr::StdcallOnWindows),
    ] {
        match ctx.abi(attr) {
            Ok(abi) => println!(
                "  {:<20} {} ({} GP, {} FP, {:?})",
                name,
                abi.convention(),
                abi.gp_count(),
                abi.fp_count(),
                abi.fp_policy()
            ),
            Err(e) => println!("  {:<20} unavailable: {}", name, e),
        }
    }

    if !config.loader.search.is_empty() {
        println!();
        println!("Library search:");
        for lib in &config.loader.search {
            println!("  {}", lib);
        }
    }

    println!();
    println!("Environment:");
    match std::env::var("UNA_LOG") {
        Ok(val) => println!("  UNA_LOG = {}", val),
        Err(_) => println!("  UNA_LOG   (not set)"),
    }

    Ok(())
}
