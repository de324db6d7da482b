//! `config` - print the effective configuration

use super::Context;
use crate::Format;
use anyhow::Result;

pub fn run(ctx: &Context, format: Format) -> Result<()> {
    let config = &ctx.config;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&config.app)?),
        Format::Text => {
            match &config.path {
                Some(path) => println!("# loaded from {}", path.display()),
                None => println!("# built-in defaults"),
            }
            print!("{}", toml::to_string_pretty(&config.app)?);
        }
    }
    Ok(())
}
