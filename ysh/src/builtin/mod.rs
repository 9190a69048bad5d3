use crate::process::PipelineSpec;
use crate::shell::Shell;
use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub mod exit;
pub mod jobs;

/// A builtin runs inside the shell process and receives the full argv,
/// command name included.
pub type BuiltinCommand = fn(shell: &mut Shell, argv: &[String]) -> Result<()>;

pub static BUILTIN_COMMAND: Lazy<HashMap<&'static str, BuiltinCommand>> = Lazy::new(|| {
    let mut builtin = HashMap::new();

    builtin.insert("exit", exit::command as BuiltinCommand);
    builtin.insert("jobs", jobs::command as BuiltinCommand);
    builtin.insert("fg", jobs::execute_fg as BuiltinCommand);
    builtin.insert("bg", jobs::execute_bg as BuiltinCommand);

    builtin
});

pub fn get_command(name: &str) -> Option<(&'static str, BuiltinCommand)> {
    BUILTIN_COMMAND
        .get_key_value(name)
        .map(|(name, command)| (*name, *command))
}

/// Builtins only run as a single-stage command line; inside a pipeline the
/// name is looked up on PATH like any other program.
pub fn find(spec: &PipelineSpec) -> Option<(&'static str, BuiltinCommand)> {
    match spec.stages.as_slice() {
        [stage] => stage.argv.first().and_then(|name| get_command(name)),
        _ => None,
    }
}

/// Builtins run inside the shell process, so they take neither `&` nor
/// redirections.
pub fn check_plain(name: &str, spec: &PipelineSpec) -> Result<()> {
    if spec.background {
        bail!("{}: builtins cannot run in the background", name);
    }
    let redirected = spec.stages.iter().any(|stage| {
        [&stage.stdin, &stage.stdout, &stage.stderr]
            .iter()
            .any(|endpoint| !endpoint.is_inherited())
    });
    if redirected {
        bail!("{}: builtins do not support redirection", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Endpoint, StageSpec};

    fn spec(stages: &[&[&str]]) -> PipelineSpec {
        PipelineSpec {
            text: String::new(),
            stages: stages
                .iter()
                .map(|argv| StageSpec::new(argv.iter().map(|s| s.to_string()).collect()))
                .collect(),
            background: false,
        }
    }

    #[test]
    fn finds_single_stage_builtins() {
        assert_eq!(find(&spec(&[&["jobs"]])).map(|(name, _)| name), Some("jobs"));
        assert_eq!(find(&spec(&[&["fg", "%1"]])).map(|(name, _)| name), Some("fg"));
        assert!(find(&spec(&[&["ls"]])).is_none());
        assert!(find(&spec(&[&["jobs"], &["cat"]])).is_none());
    }

    #[test]
    fn builtins_reject_background_and_redirection() {
        let plain = spec(&[&["jobs"]]);
        assert!(check_plain("jobs", &plain).is_ok());

        let mut background = spec(&[&["jobs"]]);
        background.background = true;
        let err = check_plain("jobs", &background).unwrap_err();
        assert_eq!(err.to_string(), "jobs: builtins cannot run in the background");

        let mut redirected = spec(&[&["fg"]]);
        redirected.stages[0].stdout = Endpoint::from(tempfile::tempfile().unwrap());
        let err = check_plain("fg", &redirected).unwrap_err();
        assert_eq!(err.to_string(), "fg: builtins do not support redirection");
    }
}
