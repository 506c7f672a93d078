//! Offline expression corpus: every listed draw expression must compile.

use ns_draw::{CompiledExpr, DrawError};
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[derive(serde::Deserialize)]
struct Corpus {
    schema_version: String,
    expressions: Vec<String>,
}

#[test]
fn draw_expr_corpora_compile() {
    let dir = repo_root().join("tests/fixtures/draw_expr_corpus");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .expect("read draw_expr_corpus dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.file_name().and_then(|s| s.to_str()).unwrap_or("").ends_with("_exprs.json"))
        .collect();
    files.sort();
    assert!(!files.is_empty(), "expected at least one *_exprs.json under {}", dir.display());

    let mut failures: Vec<(String, String, String)> = Vec::new();
    for path in files {
        let text = std::fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("read {}", path.display()));
        let corpus: Corpus =
            serde_json::from_str(&text).unwrap_or_else(|_| panic!("parse {}", path.display()));
        assert_eq!(
            corpus.schema_version,
            "draw_expr_corpus_v0",
            "unexpected schema_version in {}",
            path.display()
        );

        for expr in corpus.expressions {
            for dim in ns_draw::split_dims(&expr) {
                if let Err(e) = CompiledExpr::compile(dim) {
                    failures.push((path.display().to_string(), expr.clone(), e.to_string()));
                }
            }
        }
    }

    if !failures.is_empty() {
        let mut msg = String::new();
        msg.push_str(&format!("{} expression(s) failed to compile:\n", failures.len()));
        for (path, expr, err) in failures {
            msg.push_str(&format!("- [{path}] {expr}\n  {err}\n"));
        }
        panic!("{msg}");
    }
}

#[test]
fn malformed_expressions_are_rejected() {
    let syntax = ["Jet_pt[", "a +", "MET_pt = 40", "(a", "a b", "x[0](1)", "é > 1"];
    for expr in syntax {
        match CompiledExpr::compile(expr) {
            Err(DrawError::Syntax { line, col, .. }) => {
                assert_eq!(line, 1, "{expr}");
                assert!(col >= 1, "{expr}");
            }
            other => panic!("expected syntax error for '{expr}', got {other:?}"),
        }
    }

    let unsupported = ["Jet_pt[-2]", "Jet_pt[::2]", "sum(a, b)", "min(a, b, c)", "length()", "'x' + 1"];
    for expr in unsupported {
        assert!(
            matches!(CompiledExpr::compile(expr), Err(DrawError::Unsupported { .. })),
            "expected unsupported for '{expr}'"
        );
    }
}

#[test]
fn compile_is_deterministic_across_corpus() {
    let exprs = ["sum(Jet_pt[:2])", "a < b < c", "Jet_eta[argmin(Jet_pt)]", "min(MET_pt, 50)"];
    for e in exprs {
        let a = CompiledExpr::compile(e).unwrap();
        let b = CompiledExpr::compile(e).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }
    assert_eq!(
        CompiledExpr::compile("a < b < c").unwrap().to_string(),
        "((a < b) & (b < c))"
    );
}
