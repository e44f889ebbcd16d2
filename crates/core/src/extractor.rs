//! Three pure functions over file bytes: symbol extraction, keyword extraction, chunking.
//!
//! Structural parsing is grounded in the teacher's tree-sitter walk (`language_for_ext`,
//! `classify_node`, `walk_node`), feature-gated behind `treesitter` exactly as the teacher gates
//! it, collapsed from the teacher's ten-way `SymbolKind` down to the four kinds SPEC_FULL.md §3
//! names (`function`, `class`, `interface`, `type`). When no grammar is available (or the
//! `treesitter` feature is off), extraction falls back to the regex table described in
//! SPEC_FULL.md §4.2 and §9: patterns are tried most-specific-first per extension, and the first
//! pattern to match a line wins outright — no later pattern is tried against that line.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Chunk, Symbol, SymbolKind};

#[cfg(feature = "treesitter")]
mod structural {
    use tree_sitter::{Language, Node, Parser};

    use crate::types::{Symbol, SymbolKind};

    fn language_for_ext(ext: &str) -> Option<Language> {
        match ext {
            "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
            "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
            "go" => Some(tree_sitter_go::LANGUAGE.into()),
            "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
            "java" => Some(tree_sitter_java::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Map a tree-sitter node kind to one of the four symbol kinds the spec recognizes.
    /// Returns `None` either because the node isn't a declaration, or (for `export_statement` /
    /// `type_declaration`) because the declaration lives in a child and we should keep descending.
    fn classify_node(kind: &str) -> Option<SymbolKind> {
        match kind {
            "function_item" | "function_declaration" | "function_definition" => {
                Some(SymbolKind::Function)
            }
            "method_definition" | "method_declaration" => Some(SymbolKind::Function),
            "struct_item" | "class_declaration" | "class_definition" | "struct_specifier"
            | "class_specifier" | "enum_item" | "enum_specifier" | "enum_declaration" => {
                Some(SymbolKind::Class)
            }
            "trait_item" | "interface_declaration" => Some(SymbolKind::Interface),
            "type_item" | "type_alias_declaration" | "type_spec" | "const_item"
            | "static_item" | "impl_item" => Some(SymbolKind::Type),
            _ => None,
        }
    }

    fn is_rust(ext: &str) -> bool {
        ext == "rs"
    }
    fn is_c_cpp(ext: &str) -> bool {
        matches!(ext, "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx")
    }
    fn is_go(ext: &str) -> bool {
        ext == "go"
    }

    fn extract_name<'a>(node: &Node<'a>, source: &'a [u8], ext: &str) -> Option<String> {
        for field in &["name", "type"] {
            if let Some(name_node) = node.child_by_field_name(*field) {
                if let Ok(text) = name_node.utf8_text(source) {
                    let name = text.trim().to_string();
                    if !name.is_empty() {
                        return Some(name);
                    }
                }
            }
        }

        if node.kind() == "impl_item" && is_rust(ext) {
            if let Some(type_node) = node.child_by_field_name("type") {
                if let Ok(text) = type_node.utf8_text(source) {
                    return Some(text.trim().to_string());
                }
            }
        }

        if node.kind() == "type_spec" && is_go(ext) {
            if let Some(child) = node.named_child(0) {
                if let Ok(text) = child.utf8_text(source) {
                    return Some(text.trim().to_string());
                }
            }
        }

        if (node.kind() == "function_definition" && is_c_cpp(ext)) || node.kind() == "function_item"
        {
            if let Some(decl) = node.child_by_field_name("declarator") {
                if let Some(name_node) = decl.child_by_field_name("declarator") {
                    if let Ok(text) = name_node.utf8_text(source) {
                        return Some(text.trim().to_string());
                    }
                }
                if let Ok(text) = decl.utf8_text(source) {
                    let s = text.trim();
                    if let Some(paren) = s.find('(') {
                        return Some(s[..paren].trim().to_string());
                    }
                    return Some(s.to_string());
                }
            }
        }

        None
    }

    fn walk_node(node: &Node, source: &[u8], ext: &str, out: &mut Vec<Symbol>, seen_lines: &mut std::collections::HashSet<usize>) {
        let kind = node.kind();
        if let Some(sym_kind) = classify_node(kind) {
            let line = node.start_position().row + 1;
            // At most one symbol per source line (SPEC_FULL.md §4.2).
            if !seen_lines.contains(&line) {
                if let Some(name) = extract_name(node, source, ext) {
                    seen_lines.insert(line);
                    out.push(Symbol { name, kind: sym_kind, line: line as u32 });
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            walk_node(&child, source, ext, out, seen_lines);
        }
    }

    /// Attempt a structural parse; `None` means no grammar for this extension, or the parse
    /// produced no declarations (caller should fall back to the regex table).
    pub fn parse(content: &str, ext: &str) -> Option<Vec<Symbol>> {
        let lang = language_for_ext(ext)?;
        let mut parser = Parser::new();
        parser.set_language(&lang).ok()?;
        let tree = parser.parse(content, None)?;
        let source = content.as_bytes();

        let mut symbols = Vec::new();
        let mut seen_lines = std::collections::HashSet::new();
        let mut cursor = tree.root_node().walk();
        for child in tree.root_node().children(&mut cursor) {
            walk_node(&child, source, ext, &mut symbols, &mut seen_lines);
        }

        if symbols.is_empty() {
            None
        } else {
            symbols.sort_by_key(|s| s.line);
            Some(symbols)
        }
    }
}

// ---------------------------------------------------------------------------
// Regex fallback table
// ---------------------------------------------------------------------------

/// One regex pattern keyed to a symbol kind; the capture group named `name` is the symbol name.
struct Pattern {
    kind: SymbolKind,
    regex: Regex,
}

/// Patterns for one extension, tried in order; the first to match a line wins.
/// Order is most-specific-first: interface/trait before class, enum/struct before a generic type.
fn patterns_for_ext(ext: &str) -> &'static [(SymbolKind, &'static str)] {
    match ext {
        "py" | "pyi" => &[
            (SymbolKind::Class, r"^\s*class\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
        ],
        "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => &[
            (SymbolKind::Interface, r"^\s*(?:export\s+)?interface\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:export\s+)?(?:default\s+)?class\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Type, r"^\s*(?:export\s+)?type\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
        ],
        "go" => &[
            (SymbolKind::Interface, r"^\s*type\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s+interface\b"),
            (SymbolKind::Class, r"^\s*type\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s+struct\b"),
            (SymbolKind::Type, r"^\s*type\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\b"),
            (SymbolKind::Function, r"^\s*func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\("),
        ],
        "rs" => &[
            (SymbolKind::Interface, r"^\s*(?:pub\s+)?trait\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Type, r"^\s*(?:pub\s+)?type\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
        ],
        "java" => &[
            (SymbolKind::Interface, r"^\s*(?:public\s+)?interface\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:public\s+|private\s+|protected\s+)*(?:abstract\s+)?(?:class|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\]]+\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\("),
        ],
        "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => &[
            (SymbolKind::Class, r"^\s*(?:class|struct|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Type, r"^\s*typedef\s.+?(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*;"),
            (SymbolKind::Function, r"^[A-Za-z_][\w:<>\*&\s]*?\s(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\([^;{]*\)\s*\{"),
        ],
        "rb" => &[
            (SymbolKind::Class, r"^\s*(?:class|module)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*def\s+(?P<name>[A-Za-z_][A-Za-z0-9_?!]*)"),
        ],
        "php" => &[
            (SymbolKind::Interface, r"^\s*interface\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:abstract\s+)?class\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:public\s+|private\s+|protected\s+)?function\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
        ],
        "cs" => &[
            (SymbolKind::Interface, r"^\s*(?:public\s+)?interface\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:public\s+|private\s+|internal\s+)*(?:abstract\s+|sealed\s+)?(?:class|struct|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*(?:public|private|protected|internal)\s+(?:static\s+)?[\w<>\[\]]+\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\("),
        ],
        "swift" => &[
            (SymbolKind::Interface, r"^\s*protocol\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Class, r"^\s*(?:final\s+)?(?:class|struct|enum)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
            (SymbolKind::Function, r"^\s*func\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)"),
        ],
        _ => &[],
    }
}

static COMPILED_PATTERNS: OnceLock<std::sync::Mutex<std::collections::HashMap<&'static str, Vec<Pattern>>>> =
    OnceLock::new();

fn regex_extract(content: &str, ext: &str) -> Vec<Symbol> {
    let table = patterns_for_ext(ext);
    if table.is_empty() {
        return Vec::new();
    }

    let cache = COMPILED_PATTERNS.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut cache = cache.lock().unwrap();
    let compiled = cache.entry(ext).or_insert_with(|| {
        table
            .iter()
            .map(|(kind, pat)| Pattern { kind: *kind, regex: Regex::new(pat).unwrap() })
            .collect()
    });

    let mut symbols = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        // Fixed try-order, most-specific first; first pattern to match this line wins.
        for pattern in compiled.iter() {
            if let Some(caps) = pattern.regex.captures(line) {
                if let Some(name) = caps.name("name") {
                    symbols.push(Symbol {
                        name: name.as_str().to_string(),
                        kind: pattern.kind,
                        line: (idx + 1) as u32,
                    });
                    break;
                }
            }
        }
    }
    symbols
}

/// Produce `[{name, kind, line}]`, preferring a structural parse and falling back to the regex
/// table on failure or when no grammar is available for `ext`.
pub fn extract_symbols(content: &str, ext: &str) -> Vec<Symbol> {
    #[cfg(feature = "treesitter")]
    {
        if let Some(symbols) = structural::parse(content, ext) {
            return symbols;
        }
    }
    regex_extract(content, ext)
}

// ---------------------------------------------------------------------------
// Keyword extraction
// ---------------------------------------------------------------------------

const STOPWORDS: &[&str] = &[
    "the", "import", "return", "class", "def", "function", "const", "let", "var", "true",
    "false", "null", "self", "type", "pass", "print", "and", "for", "with", "from", "this",
    "else", "elif", "while", "new", "public", "private", "static", "void", "use", "mod", "pub",
    "fn", "end", "then", "not",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn split_camel_and_snake(token: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = token.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if i > 0 && chars[i - 1].is_lowercase() && c.is_uppercase() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn alpha_runs(content: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();
    for c in content.chars() {
        if c.is_alphabetic() || c == '_' {
            current.push(c);
        } else {
            if current.len() >= 3 {
                runs.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 3 {
        runs.push(current);
    }
    runs
}

/// Extract alphabetic runs (len >= 3), split on camelCase/snake_case, drop stopwords and
/// sub-length-3 tokens, and return the top-n most frequent, ties broken by first-seen order.
pub fn extract_keywords(content: &str, top_n: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for run in alpha_runs(content) {
        for sub in split_camel_and_snake(&run) {
            if sub.len() <= 2 || is_stopword(&sub) {
                continue;
            }
            if let Some(&i) = index.get(&sub) {
                counts[i].1 += 1;
            } else {
                index.insert(sub.clone(), counts.len());
                counts.push((sub, 1));
            }
        }
    }

    let mut ranked: Vec<(usize, String, usize)> =
        counts.into_iter().enumerate().map(|(pos, (word, count))| (pos, word, count)).collect();
    // Descending frequency, ties broken by first-seen order (ascending position).
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(top_n).map(|(_, word, _)| word).collect()
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Produce ordered chunks covering the file, per SPEC_FULL.md §4.2.
pub fn chunk_file(content: &str, symbols: &[Symbol], max_chunk_lines: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = if content.is_empty() { Vec::new() } else { content.lines().collect() };
    let total = lines.len();

    if total == 0 {
        return vec![Chunk {
            chunk_index: 0,
            start_line: 0,
            end_line: 0,
            content: String::new(),
            symbol: None,
        }];
    }

    let slice = |start: usize, end: usize| -> String {
        // start/end are 1-based inclusive.
        lines[(start - 1).min(total - 1)..end.min(total)].join("\n")
    };

    if symbols.is_empty() {
        let end = total.min(200);
        return vec![Chunk {
            chunk_index: 0,
            start_line: 1,
            end_line: end as u32,
            content: slice(1, end),
            symbol: None,
        }];
    }

    let mut sorted: Vec<&Symbol> = symbols.iter().collect();
    sorted.sort_by_key(|s| s.line);

    let mut chunks = Vec::new();
    let mut idx = 0u32;

    if sorted[0].line > 1 {
        let end = (sorted[0].line as usize - 1).min(total);
        chunks.push(Chunk {
            chunk_index: idx,
            start_line: 1,
            end_line: end as u32,
            content: slice(1, end),
            symbol: None,
        });
        idx += 1;
    }

    for (i, sym) in sorted.iter().enumerate() {
        let start = sym.line as usize;
        let next_start = sorted.get(i + 1).map(|s| s.line as usize);
        let mut end = total.min(start + max_chunk_lines - 1);
        if let Some(next) = next_start {
            end = end.min(next.saturating_sub(1));
        }
        let end = end.max(start).min(total);
        chunks.push(Chunk {
            chunk_index: idx,
            start_line: start as u32,
            end_line: end as u32,
            content: slice(start, end),
            symbol: Some(sym.name.clone()),
        });
        idx += 1;
    }

    chunks
}
