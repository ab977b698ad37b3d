//! `una selftest`: Call the built-in sanity function through the default ABI.

pub fn execute() -> anyhow::Result<()> {
    let ctx = una::setup()?;
    println!(
        "Self-test passed on {} ({})",
        ctx.arch_os(),
        una::context::SELF_TEST_SIGNATURE
    );
    Ok(())
}
