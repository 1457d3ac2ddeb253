//! Parser for the cluster config file format: line 1 is `count: N`, lines
//! 2..N+1 are `<index>: host:port`. Shared by every server and client binary
//! so they agree on replica addresses without duplicating the parser.

use crate::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub replicas: Vec<String>,
}

fn parse_err(message: impl Into<String>) -> SyncError {
    SyncError::Parse {
        message: message.into(),
        context: "ClusterTopology::parse".to_string(),
    }
}

impl ClusterTopology {
    pub fn parse(contents: &str) -> Result<Self, SyncError> {
        let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());

        let count_line = lines.next().ok_or_else(|| parse_err("empty cluster config"))?;
        let count: usize = count_line
            .strip_prefix("count:")
            .ok_or_else(|| parse_err(format!("expected 'count: N', found {count_line:?}")))?
            .trim()
            .parse()
            .map_err(|e| parse_err(format!("bad count: {e}")))?;

        let mut replicas = vec![String::new(); count];
        for line in lines {
            let (index_str, addr) = line
                .split_once(':')
                .ok_or_else(|| parse_err(format!("expected '<index>: host:port', found {line:?}")))?;
            let index: usize = index_str
                .trim()
                .parse()
                .map_err(|e| parse_err(format!("bad replica index: {e}")))?;
            if index >= count {
                return Err(parse_err(format!(
                    "replica index {index} out of range for count {count}"
                )));
            }
            replicas[index] = addr.trim().to_string();
        }

        if replicas.iter().any(String::is_empty) {
            return Err(parse_err(
                "cluster config is missing an entry for one or more replica indices",
            ));
        }

        Ok(ClusterTopology { replicas })
    }
}
