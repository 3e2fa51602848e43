//! Parsing of symbolic tensor specifications.
//!
//! A specification has the form `Result(i,j,...) = OperandA(...) * OperandB(...)`.
//! Index names occurring in the result are open; index names occurring on
//! two operands and absent from the result are contracted. A `+` suffix on
//! an operand name (`A+(i,j)`) marks it as complex-conjugated.

use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};

/// One tensor occurrence in a symbolic specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicTerm {
    pub name: String,
    pub conjugated: bool,
    pub indices: Vec<String>,
}

/// A parsed symbolic specification: the result term and its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicSpec {
    pub result: SymbolicTerm,
    pub operands: Vec<SymbolicTerm>,
}

impl SymbolicSpec {
    /// Maps every distinct index name to a small integer label, in order
    /// of first appearance, and returns the per-term label vectors
    /// (result first, then the operands).
    pub fn label_ids(&self) -> (FxHashMap<String, usize>, Vec<Vec<usize>>) {
        let mut labels = FxHashMap::default();
        let mut terms = Vec::with_capacity(1 + self.operands.len());
        for term in std::iter::once(&self.result).chain(self.operands.iter()) {
            let ids = term
                .indices
                .iter()
                .map(|index| {
                    let next = labels.len();
                    *labels.entry(index.clone()).or_insert(next)
                })
                .collect();
            terms.push(ids);
        }
        (labels, terms)
    }

    /// Index names occurring in operands but not in the result.
    pub fn contracted_indices(&self) -> Vec<&str> {
        let mut contracted = Vec::new();
        for operand in &self.operands {
            for index in &operand.indices {
                if !self.result.indices.contains(index)
                    && !contracted.contains(&index.as_str())
                {
                    contracted.push(index.as_str());
                }
            }
        }
        contracted
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_term(input: &str) -> Result<SymbolicTerm> {
    let term = input.trim();
    let open = term
        .find('(')
        .ok_or_else(|| Error::Validation(format!("term '{term}' is missing '('")))?;
    if !term.ends_with(')') {
        return Err(Error::Validation(format!("term '{term}' is missing ')'")));
    }
    let (mut name, args) = (term[..open].trim(), &term[open + 1..term.len() - 1]);
    let conjugated = name.ends_with('+');
    if conjugated {
        name = name[..name.len() - 1].trim_end();
    }
    if !is_ident(name) {
        return Err(Error::Validation(format!(
            "'{name}' is not a valid tensor name"
        )));
    }
    let indices: Vec<String> = if args.trim().is_empty() {
        Vec::new()
    } else {
        args.split(',').map(|s| s.trim().to_string()).collect()
    };
    for index in &indices {
        if !is_ident(index) {
            return Err(Error::Validation(format!(
                "'{index}' is not a valid index name in term '{term}'"
            )));
        }
    }
    Ok(SymbolicTerm {
        name: name.to_string(),
        conjugated,
        indices,
    })
}

/// Parses a full symbolic specification.
///
/// # Examples
/// ```
/// use tensornet::symbolic::parse_spec;
///
/// let spec = parse_spec("C(i,j) = A(i,k) * B(k,j)").unwrap();
/// assert_eq!(spec.result.name, "C");
/// assert_eq!(spec.operands.len(), 2);
/// assert_eq!(spec.contracted_indices(), vec!["k"]);
/// ```
pub fn parse_spec(input: &str) -> Result<SymbolicSpec> {
    let (lhs, rhs) = input
        .split_once('=')
        .ok_or_else(|| Error::Validation(format!("specification '{input}' is missing '='")))?;
    let result = parse_term(lhs)?;
    if result.conjugated {
        return Err(Error::Validation(format!(
            "the result tensor '{}' can not be conjugated",
            result.name
        )));
    }
    let operands = rhs
        .split('*')
        .map(parse_term)
        .collect::<Result<Vec<_>>>()?;
    if operands.is_empty() {
        return Err(Error::Validation(format!(
            "specification '{input}' has no operands"
        )));
    }

    // Every index must occur once or twice in total and never twice on the
    // same term; twice-in-operands means contracted, once-in-operands plus
    // once-in-result means open.
    let mut occurrences = FxHashMap::<&str, usize>::default();
    for term in std::iter::once(&result).chain(operands.iter()) {
        for (i, index) in term.indices.iter().enumerate() {
            if term.indices[..i].contains(index) {
                return Err(Error::Validation(format!(
                    "index '{index}' repeats within term '{}'",
                    term.name
                )));
            }
            *occurrences.entry(index.as_str()).or_default() += 1;
        }
    }
    for (index, count) in occurrences {
        if count > 2 {
            return Err(Error::Validation(format!(
                "index '{index}' occurs {count} times in '{input}'"
            )));
        }
        if count == 1 && !result.indices.iter().any(|i| i == index) {
            return Err(Error::Validation(format!(
                "index '{index}' occurs only once among the operands of '{input}'"
            )));
        }
    }
    for index in &result.indices {
        let in_operands = operands
            .iter()
            .flat_map(|t| t.indices.iter())
            .filter(|i| *i == index)
            .count();
        if in_operands != 1 {
            return Err(Error::Validation(format!(
                "result index '{index}' must occur on exactly one operand in '{input}'"
            )));
        }
    }

    Ok(SymbolicSpec { result, operands })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contraction() {
        let spec = parse_spec("C(i,j)=A(i,k)*B(k,j)").unwrap();
        assert_eq!(spec.result.name, "C");
        assert_eq!(spec.result.indices, vec!["i", "j"]);
        assert_eq!(spec.operands[0].name, "A");
        assert_eq!(spec.operands[1].name, "B");
        assert_eq!(spec.contracted_indices(), vec!["k"]);
    }

    #[test]
    fn test_parse_conjugated_operand() {
        let spec = parse_spec("N() = A+(i,j) * A(i,j)").unwrap();
        assert!(spec.operands[0].conjugated);
        assert!(!spec.operands[1].conjugated);
        assert_eq!(spec.result.indices.len(), 0);
    }

    #[test]
    fn test_parse_three_factor_decomposition() {
        let spec = parse_spec("D(a,b,c) = L(a,i) * S(i,j) * R(j,b,c)").unwrap();
        assert_eq!(spec.operands.len(), 3);
        assert_eq!(spec.contracted_indices(), vec!["i", "j"]);
    }

    #[test]
    fn test_label_ids_first_appearance_order() {
        let spec = parse_spec("C(i,j)=A(i,k)*B(k,j)").unwrap();
        let (labels, terms) = spec.label_ids();
        assert_eq!(labels["i"], 0);
        assert_eq!(labels["j"], 1);
        assert_eq!(labels["k"], 2);
        assert_eq!(terms, vec![vec![0, 1], vec![0, 2], vec![2, 1]]);
    }

    #[test]
    fn test_reject_malformed() {
        assert!(parse_spec("C(i,j)").is_err());
        assert!(parse_spec("C(i,j) = A(i,k) + B(k,j)").is_err());
        assert!(parse_spec("(i,j) = A(i,k) * B(k,j)").is_err());
        assert!(parse_spec("C(i,j) = A(i,k) * B(k,j,k)").is_err());
        // Dangling index on a single operand.
        assert!(parse_spec("C(i) = A(i,k) * B(j,j)").is_err());
    }
}
