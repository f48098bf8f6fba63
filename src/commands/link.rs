//! # Link Command

use anyhow::Result;
use colored::Colorize;

const NOT_READY: &str = "This command is developing, you can init a new widget to
the space that you want to transform to, then copy the source code from existing widget and release it";

/// Execute the `widget-cli link` command
pub fn execute() -> Result<()> {
    println!("{}", NOT_READY.green());
    Ok(())
}
