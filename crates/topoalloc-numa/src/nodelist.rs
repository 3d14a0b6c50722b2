//! Compact node-list syntax (`0-3,5`), as used by cgroup `cpuset.mems`

use crate::{NumaError, NumaResult};

/// Parse a node list into ascending, de-duplicated node IDs.
///
/// An empty (or all-whitespace) list yields no nodes.
pub fn parse(input: &str) -> NumaResult<Vec<i32>> {
    let invalid = |reason: String| NumaError::InvalidNodeList {
        input: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut nodes = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            None => nodes.push(parse_node(part).map_err(&invalid)?),
            Some((start, end)) => {
                let start = parse_node(start).map_err(&invalid)?;
                let end = parse_node(end).map_err(&invalid)?;
                if start > end {
                    return Err(invalid(format!(
                        "invalid range {:?} ({} > {})",
                        part, start, end
                    )));
                }
                nodes.extend(start..=end);
            }
        }
    }

    nodes.sort_unstable();
    nodes.dedup();
    Ok(nodes)
}

fn parse_node(s: &str) -> Result<i32, String> {
    s.trim()
        .parse::<u16>()
        .map(i32::from)
        .map_err(|e| format!("invalid node {:?}: {}", s, e))
}

/// Format node IDs as a compact list, collapsing consecutive runs into
/// ranges: `[0, 1, 2, 7]` becomes `0-2,7`.
pub fn format(nodes: &[i32]) -> String {
    let mut sorted = nodes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(i32, i32)> = Vec::new();
    for node in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == node => *end = node,
            _ => ranges.push((node, node)),
        }
    }

    ranges
        .iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(parse("0-3,5").unwrap(), vec![0, 1, 2, 3, 5]);
        assert_eq!(parse("7").unwrap(), vec![7]);
        assert_eq!(parse("3,1,1-2").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse(" 0,2\n").unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            parse("3-1"),
            Err(NumaError::InvalidNodeList { .. })
        ));
        assert!(parse("a").is_err());
        assert!(parse("0,,1").is_err());
        assert!(parse("-1").is_err());
        assert!(parse("1-").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format(&[0, 1, 2, 7]), "0-2,7");
        assert_eq!(format(&[5]), "5");
        assert_eq!(format(&[3, 1, 2, 2]), "1-3");
        assert_eq!(format(&[0, 2, 4]), "0,2,4");
        assert_eq!(format(&[]), "");
    }

    #[test]
    fn test_format_parses_back() {
        let nodes = vec![0, 1, 3, 4, 5, 9];
        assert_eq!(parse(&format(&nodes)).unwrap(), nodes);
    }
}
