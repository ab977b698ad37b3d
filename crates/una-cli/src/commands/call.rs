//! `una call`: Bind a symbol and call it with arguments from the command line.

use anyhow::{bail, Context};
use std::ffi::{c_char, c_void};

use crate::config::UnaConfig;
use una::{Library, UnaType};

/// Options for `una call`
pub struct CallOptions {
    pub symbol: String,
    pub signature: String,
    pub args: Vec<String>,
    pub libs: Vec<String>,
    pub convention: Option<String>,
}

/// C strings allocated for `@text` arguments, freed on drop.
#[derive(Default)]
struct CStrings(Vec<*mut c_char>);

impl Drop for CStrings {
    fn drop(&mut self) {
        for ptr in self.0.drain(..) {
            unsafe { una::mem::free(ptr as *mut c_void) };
        }
    }
}

pub fn execute(config: &UnaConfig, options: CallOptions) -> anyhow::Result<()> {
    let ctx = una::setup()?;
    let attr = super::resolve_convention(config, options.convention.as_deref())?;
    let abi = ctx.abi(attr)?;

    let library = open_library(config, &options.libs)?;
    let func = library.bind(&options.symbol, &abi, &options.signature)?;
    let invoker = func.invoker();

    if options.args.len() != invoker.args().len() {
        bail!(
            "{} takes {} arguments, {} given",
            options.signature,
            invoker.args().len(),
            options.args.len()
        );
    }

    let mut strings = CStrings::default();
    let mut slots = Vec::with_capacity(options.args.len());
    for (i, (text, ty)) in options.args.iter().zip(invoker.args()).enumerate() {
        let slot = match text.strip_prefix('@') {
            Some(s) => {
                let ptr = una::mem::strdup(s)?;
                strings.0.push(ptr);
                ptr as usize as u64
            }
            None => parse_arg(text, *ty).with_context(|| format!("argument {}", i))?,
        };
        slots.push(slot);
    }

    log::info!("calling {} in {} as {}", options.symbol, library.path(), invoker);
    let raw = unsafe { func.call(&slots)? };
    drop(strings);

    println!("raw:    {:#018x}", raw);
    println!("value:  {}", format_result(raw, invoker.ret()));
    Ok(())
}

fn open_library(config: &UnaConfig, libs: &[String]) -> anyhow::Result<Library> {
    if !libs.is_empty() {
        return Ok(Library::open_first(libs)?);
    }
    if !config.loader.search.is_empty() {
        return Ok(Library::open_first(&config.loader.search)?);
    }
    #[cfg(unix)]
    {
        Ok(Library::this_process()?)
    }
    #[cfg(not(unix))]
    {
        bail!("no library given; pass --lib or set [loader] search in una.toml")
    }
}

/// Convert one command-line argument to a slot for a parameter of type `ty`.
fn parse_arg(text: &str, ty: UnaType) -> anyhow::Result<u64> {
    match ty {
        UnaType::F32 => Ok(una::slot::f32(text.parse()?)),
        UnaType::F64 => Ok(una::slot::f64(text.parse()?)),
        _ => parse_int(text),
    }
}

fn parse_int(text: &str) -> anyhow::Result<u64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse::<u64>(),
    }
    .with_context(|| format!("'{}' is not an integer", text))?;
    Ok(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

fn format_result(raw: u64, ty: UnaType) -> String {
    match ty {
        UnaType::F32 => format!("{}", f32::from_bits(raw as u32)),
        UnaType::F64 => format!("{}", f64::from_bits(raw)),
        t if t.is_signed() => format!("{}", raw as i64),
        _ => format!("{}", raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-1").unwrap(), u64::MAX);
        assert_eq!(parse_int("0xff").unwrap(), 255);
        assert_eq!(parse_int("-0x10").unwrap(), (-16i64) as u64);
        assert!(parse_int("forty").is_err());
    }

    #[test]
    fn test_parse_float_args() {
        assert_eq!(parse_arg("1.5", UnaType::F64).unwrap(), 1.5f64.to_bits());
        assert_eq!(parse_arg("1.5", UnaType::F32).unwrap(), 1.5f32.to_bits() as u64);
        assert_eq!(parse_arg("7", UnaType::I32).unwrap(), 7);
    }

    #[test]
    fn test_format_result() {
        assert_eq!(format_result(u64::MAX, UnaType::I32), "-1");
        assert_eq!(format_result(0xFF, UnaType::U8), "255");
        assert_eq!(format_result(2.5f64.to_bits(), UnaType::F64), "2.5");
        assert_eq!(format_result(0.5f32.to_bits() as u64, UnaType::F32), "0.5");
    }
}
