use crate::shell::Shell;
use anyhow::{Result, bail};

/// `exit [code]`: kill every tracked job and leave the shell.
pub fn command(shell: &mut Shell, argv: &[String]) -> Result<()> {
    let code = match argv.get(1) {
        None => 0,
        Some(arg) => match arg.parse::<i32>() {
            Ok(code) => code,
            Err(_) => bail!("exit: {}: numeric argument required", arg),
        },
    };
    shell.exit(code);
    Ok(())
}
