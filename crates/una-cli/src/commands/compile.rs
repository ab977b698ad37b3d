//! `una compile`: Show how a signature is laid out in registers and stack.

use crate::config::UnaConfig;
use una::invoke::BASE_F;

pub fn execute(
    config: &UnaConfig,
    signature: &str,
    convention: Option<&str>,
    arch_os: Option<&str>,
) -> anyhow::Result<()> {
    let ctx = super::resolve_context(config, arch_os)?;
    let attr = super::resolve_convention(config, convention)?;
    let abi = ctx.abi(attr)?;
    let proto = abi.type_info().parse(signature)?;
    let invoker = abi.compile(&proto)?;

    println!("Target:       {} ({:?})", ctx.arch_os(), attr);
    println!("Convention:   {}", invoker.convention());
    println!("Prototype:    {}", proto);
    println!("Stack words:  {}", invoker.stack_words());
    println!();
    println!("Commands:");
    for cmd in invoker.commands() {
        let dest = cmd.dest();
        let place = if dest >= BASE_F {
            format!("fp{}", dest - BASE_F)
        } else if dest < abi.stack_start() {
            format!("gp{}", dest)
        } else {
            format!("stack[{}]", dest - abi.stack_start())
        };
        println!(
            "  arg{:<3} {:<4} -> {:<10} {}",
            cmd.source(),
            proto.args()[cmd.source()],
            place,
            cmd
        );
    }
    println!();
    println!("{}", invoker);
    Ok(())
}
