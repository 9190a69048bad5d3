use crate::process::{Endpoint, PipelineSpec, Redirect, StageSpec};
use pest::Parser;
use pest_derive::Parser;
use tracing::debug;
use ysh_types::{YshError, YshResult};

#[derive(Parser)]
#[grammar = "shell.pest"]
pub struct ShellParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Operator(&'a str),
}

fn tokenize(input: &str) -> YshResult<Vec<Token<'_>>> {
    let pairs =
        ShellParser::parse(Rule::line, input).map_err(|e| YshError::Parse(e.to_string()))?;

    let mut tokens = Vec::new();
    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::word => tokens.push(Token::Word(pair.as_str())),
            Rule::operator => tokens.push(Token::Operator(pair.as_str())),
            _ => {}
        }
    }
    Ok(tokens)
}

#[derive(Debug, Default)]
struct StageBuilder {
    argv: Vec<String>,
    redirects: Vec<Redirect>,
}

impl StageBuilder {
    /// Open the redirection targets left to right; a later one on the same
    /// stream replaces (and closes) the earlier one.
    fn build(self) -> YshResult<StageSpec> {
        let mut stage = StageSpec::new(self.argv);
        for redirect in &self.redirects {
            let endpoint: Endpoint = redirect.open()?;
            match redirect {
                Redirect::Input(_) => stage.stdin = endpoint,
                Redirect::StdoutOutput(_) => stage.stdout = endpoint,
                Redirect::StderrOutput(_) => stage.stderr = endpoint,
            }
        }
        Ok(stage)
    }
}

fn syntax(msg: &str) -> YshError {
    YshError::Parse(format!("syntax error: {}", msg))
}

/// Split a line into pipeline stages. Returns `Ok(None)` for a blank line.
///
/// Redirection targets are opened here, so a stage spec carries live
/// descriptors that the launcher hands to the child.
pub fn parse_line(input: &str) -> YshResult<Option<PipelineSpec>> {
    let text = input.trim();
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    debug!("PARSE: {:?}", tokens);

    let mut builders = Vec::new();
    let mut current = StageBuilder::default();
    let mut background = false;
    let mut iter = tokens.iter().copied().peekable();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => current.argv.push(word.to_string()),
            Token::Operator("|") => {
                if current.argv.is_empty() {
                    return Err(syntax("no command before pipe"));
                }
                match iter.peek() {
                    Some(Token::Word(_)) => {}
                    _ => return Err(syntax("no argument after pipe")),
                }
                builders.push(std::mem::take(&mut current));
            }
            Token::Operator("&") => {
                if iter.peek().is_some() {
                    return Err(syntax("& must be at the end of the line"));
                }
                background = true;
            }
            Token::Operator(op) => {
                let Some(Token::Word(path)) = iter.next() else {
                    return Err(syntax("no filename after operator"));
                };
                let path = path.to_string();
                current.redirects.push(match op {
                    "<" => Redirect::Input(path),
                    "2>" => Redirect::StderrOutput(path),
                    _ => Redirect::StdoutOutput(path),
                });
            }
        }
    }
    if current.argv.is_empty() {
        return Err(syntax("missing command"));
    }
    builders.push(current);

    let stages = builders
        .into_iter()
        .map(StageBuilder::build)
        .collect::<YshResult<Vec<_>>>()?;

    Ok(Some(PipelineSpec {
        text: text.to_string(),
        stages,
        background,
    }))
}
