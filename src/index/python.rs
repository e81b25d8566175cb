//! Python function extraction on top of tree-sitter.

use super::FunctionRecord;
use std::path::Path;
use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Why a file produced no parse tree usable for indexing.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("failed to load the Python grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),
    #[error("parser returned no tree")]
    NoTree,
    #[error("syntax error near line {line}")]
    Syntax { line: usize },
}

/// Parse Python source into a tree-sitter tree.
pub fn parse_source(content: &str) -> Result<Tree, ParseFailure> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
    parser.parse(content, None).ok_or(ParseFailure::NoTree)
}

/// Collect every `def` / `async def` in `content`, outer definitions first.
///
/// Sources with syntax errors are rejected as a whole rather than indexed
/// partially.
pub fn extract_functions(content: &str, path: &Path) -> Result<Vec<FunctionRecord>, ParseFailure> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let tree = parse_source(content)?;
    let root = tree.root_node();

    if root.has_error() {
        return Err(ParseFailure::Syntax {
            line: first_error_line(root).unwrap_or(1),
        });
    }

    let line_count = content.lines().count().max(1);
    let mut functions = Vec::new();
    visit_node_for_functions(root, content, path, line_count, &mut functions);
    Ok(functions)
}

fn visit_node_for_functions(
    node: Node,
    source: &str,
    path: &Path,
    line_count: usize,
    functions: &mut Vec<FunctionRecord>,
) {
    if node.kind() == "function_definition" {
        if let Some(record) = function_record(node, source, path, line_count) {
            functions.push(record);
        }
    }

    for child in node.children(&mut node.walk()) {
        visit_node_for_functions(child, source, path, line_count, functions);
    }
}

fn function_record(
    node: Node,
    source: &str,
    path: &Path,
    line_count: usize,
) -> Option<FunctionRecord> {
    let name = node
        .child_by_field_name("name")?
        .utf8_text(source.as_bytes())
        .ok()?;
    let start_line = node_line(&node);
    let end_line = (node.end_position().row + 1).min(line_count);

    Some(FunctionRecord::new(path, name, start_line, end_line))
}

/// Get the line number for a tree-sitter node (1-indexed)
pub fn node_line(node: &Node) -> usize {
    node.start_position().row + 1
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node_line(&node));
    }
    node.children(&mut node.walk())
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn extract(source: &str) -> Vec<(String, usize, usize)> {
        extract_functions(source, Path::new("/proj/mod.py"))
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.start_line, f.end_line))
            .collect()
    }

    #[test]
    fn test_top_level_functions() {
        let source = indoc! {"
            def func_c_1(lst: list) -> int:
                return sum(lst)


            def func_c_2(lst: list) -> float:
                if not lst:
                    return 0.0
                return sum(lst) / len(lst)
        "};
        assert_eq!(
            extract(source),
            vec![
                ("func_c_1".to_string(), 1, 2),
                ("func_c_2".to_string(), 5, 8),
            ]
        );
    }

    #[test]
    fn test_methods_nested_and_async_definitions() {
        let source = indoc! {"
            import asyncio

            class Service:
                def __init__(self):
                    self.ready = True

                async def fetch(self):
                    def helper(x):
                        return x * 2
                    return helper(await asyncio.sleep(0))
        "};
        assert_eq!(
            extract(source),
            vec![
                ("__init__".to_string(), 4, 5),
                ("fetch".to_string(), 7, 10),
                ("helper".to_string(), 8, 9),
            ]
        );
    }

    #[test]
    fn test_decorated_function_starts_at_def_line() {
        let source = indoc! {"
            import functools

            @functools.lru_cache(maxsize=None)
            def cached(n):
                return n
        "};
        assert_eq!(extract(source), vec![("cached".to_string(), 4, 5)]);
    }

    #[test]
    fn test_module_without_functions() {
        let source = "VALUE = 1\nOTHER = VALUE + 1\n";
        assert!(extract(source).is_empty());
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let source = "def broken(:\n    return 1\n";
        let result = extract_functions(source, Path::new("/proj/broken.py"));
        assert!(matches!(result, Err(ParseFailure::Syntax { .. })));
    }

    #[test]
    fn test_byte_order_mark_does_not_shift_lines() {
        let source = "\u{feff}def f():\n    return 1\n";
        assert_eq!(extract(source), vec![("f".to_string(), 1, 2)]);
    }

    #[test]
    fn test_ranges_stay_within_file() {
        let source = "def last():\n    return 1";
        let functions = extract_functions(source, Path::new("/proj/m.py")).unwrap();
        let line_count = source.lines().count();
        for f in functions {
            assert!(f.start_line <= f.end_line);
            assert!(f.end_line <= line_count);
        }
    }
}
