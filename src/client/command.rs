use crate::error::ClusterError;

use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  create-int <arrayId> <size>     create an array of random integers
  create-double <arrayId> <size>  create an array of random doubles
  apply <arrayId> <operation>     apply smooth or classify
  get <arrayId>                   show the result of the last operation
  help                            show this message
  exit                            quit";

/// One line of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateInt { array_id: String, size: usize },
    CreateDouble { array_id: String, size: usize },
    Apply { array_id: String, operation: String },
    Get { array_id: String },
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = ClusterError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let usage = |text: &str| ClusterError::InvalidInput(format!("usage: {}", text));

        match parts.as_slice() {
            ["create-int", array_id, size] => Ok(Command::CreateInt {
                array_id: array_id.to_string(),
                size: parse_size(size)?,
            }),
            ["create-int", ..] => Err(usage("create-int <arrayId> <size>")),
            ["create-double", array_id, size] => Ok(Command::CreateDouble {
                array_id: array_id.to_string(),
                size: parse_size(size)?,
            }),
            ["create-double", ..] => Err(usage("create-double <arrayId> <size>")),
            ["apply", array_id, operation] => Ok(Command::Apply {
                array_id: array_id.to_string(),
                operation: operation.to_string(),
            }),
            ["apply", ..] => Err(usage("apply <arrayId> <operation>")),
            ["get", array_id] => Ok(Command::Get {
                array_id: array_id.to_string(),
            }),
            ["get", ..] => Err(usage("get <arrayId>")),
            ["help"] => Ok(Command::Help),
            ["exit"] | ["quit"] => Ok(Command::Exit),
            [] => Err(ClusterError::InvalidInput("empty command".to_string())),
            [other, ..] => Err(ClusterError::InvalidInput(format!(
                "unknown command '{}', type 'help' for usage",
                other
            ))),
        }
    }
}

fn parse_size(raw: &str) -> Result<usize, ClusterError> {
    raw.parse().map_err(|_| {
        ClusterError::InvalidInput(format!(
            "size must be a non-negative integer, got '{}'",
            raw
        ))
    })
}
