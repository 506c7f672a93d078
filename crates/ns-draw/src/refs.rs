//! Column reference extraction.
//!
//! Determines which columns an expression needs before anything is bound, so
//! that a columnar store only has to materialize those.

use std::collections::BTreeSet;

use crate::error::{DrawError, Result};
use crate::lexer::{TokenKind, tokenize};
use crate::transform::Aliases;

/// Words never treated as column names unless explicitly whitelisted.
pub const RESERVED_WORDS: &[&str] = &[
    "and", "or", "not", "abs", "min", "max", "sum", "mean", "length", "len", "argmin", "argmax",
    "True", "False",
];

/// Candidate column names referenced by `expr`.
///
/// An identifier counts when it is not preceded by `.`, not followed by `.`
/// or `(`, and not a reserved word (unless listed in `whitelist`).
///
/// ```
/// let cols = ns_draw::refs::column_refs("sum(Jet_pt[abs(Jet_eta) < 2.4]) > MET_pt", &[]).unwrap();
/// assert_eq!(cols.into_iter().collect::<Vec<_>>(), vec!["Jet_eta", "Jet_pt", "MET_pt"]);
/// ```
pub fn column_refs(expr: &str, whitelist: &[String]) -> Result<BTreeSet<String>> {
    let tokens = tokenize(expr)?;
    let mut out = BTreeSet::new();
    for (i, tok) in tokens.iter().enumerate() {
        let TokenKind::Ident(name) = &tok.kind else {
            continue;
        };
        if i > 0 && tokens[i - 1].kind == TokenKind::Dot {
            continue;
        }
        if matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::Dot | TokenKind::LParen))
        {
            continue;
        }
        if RESERVED_WORDS.contains(&name.as_str()) && !whitelist.iter().any(|w| w == name) {
            continue;
        }
        out.insert(name.clone());
    }
    Ok(out)
}

/// Union of [`column_refs`] over several expressions; empty strings are skipped.
pub fn column_refs_many<'a>(
    exprs: impl IntoIterator<Item = &'a str>,
    whitelist: &[String],
) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for expr in exprs {
        if expr.trim().is_empty() {
            continue;
        }
        out.extend(column_refs(expr, whitelist)?);
    }
    Ok(out)
}

/// [`column_refs`] with every alias name replaced by the columns of its own text.
///
/// This is the set a draw binds. Aliases may nest; a cycle is Unsupported.
pub fn column_refs_expanded(
    expr: &str,
    aliases: &Aliases,
    whitelist: &[String],
) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    expand_refs(expr, aliases, whitelist, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn expand_refs(
    expr: &str,
    aliases: &Aliases,
    whitelist: &[String],
    expanding: &mut Vec<String>,
    out: &mut BTreeSet<String>,
) -> Result<()> {
    for name in column_refs(expr, whitelist)? {
        let Some(text) = aliases.get(&name) else {
            out.insert(name);
            continue;
        };
        if expanding.contains(&name) {
            return Err(DrawError::Unsupported {
                expr: expr.to_string(),
                msg: format!("recursive alias '{name}'"),
            });
        }
        expanding.push(name);
        expand_refs(text, aliases, whitelist, expanding, out)?;
        expanding.pop();
    }
    Ok(())
}
