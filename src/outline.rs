use crate::model::{DocumentSymbol, Position, Range, SymbolKind};
use crate::symbols::MAX_SYMBOL_DEPTH;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser};

/// Syntax nesting beyond this is not walked.
const MAX_SYNTAX_DEPTH: usize = 512;

/// Source of nested symbol trees for a document.
pub trait SymbolProvider: Send {
    /// `None` means the document has no usable symbol information.
    fn document_symbols(&mut self, path: &Path) -> Option<Vec<DocumentSymbol>>;
}

/// Provider for hosts that always send their own symbols.
pub struct NoSymbols;

impl SymbolProvider for NoSymbols {
    fn document_symbols(&mut self, _path: &Path) -> Option<Vec<DocumentSymbol>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

struct GrammarSpec {
    grammar: Grammar,
    extensions: &'static [&'static str],
}

static GRAMMAR_SPECS: &[GrammarSpec] = &[
    GrammarSpec {
        grammar: Grammar::Rust,
        extensions: &["rs"],
    },
    GrammarSpec {
        grammar: Grammar::Python,
        extensions: &["py", "pyi"],
    },
    GrammarSpec {
        grammar: Grammar::JavaScript,
        extensions: &["js", "jsx", "mjs", "cjs"],
    },
    GrammarSpec {
        grammar: Grammar::TypeScript,
        extensions: &["ts", "mts", "cts"],
    },
    GrammarSpec {
        grammar: Grammar::Tsx,
        extensions: &["tsx"],
    },
    GrammarSpec {
        grammar: Grammar::Go,
        extensions: &["go"],
    },
];

impl Grammar {
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        GRAMMAR_SPECS
            .iter()
            .find(|spec| spec.extensions.contains(&ext.as_str()))
            .map(|spec| spec.grammar)
    }

    fn language(self) -> Language {
        match self {
            Grammar::Rust => tree_sitter_rust::LANGUAGE.into(),
            Grammar::Python => tree_sitter_python::LANGUAGE.into(),
            Grammar::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Grammar::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

/// Tree-sitter backed outline of declarations (types, functions, methods,
/// fields, module-level constants). Positions use byte columns.
#[derive(Default)]
pub struct OutlineProvider {
    parsers: HashMap<Grammar, Parser>,
}

impl OutlineProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outline(&mut self, grammar: Grammar, source: &str) -> Option<Vec<DocumentSymbol>> {
        let parser = self.parser(grammar)?;
        let tree = parser.parse(source, None)?;
        let mut symbols = Vec::new();
        let walker = Walker {
            grammar,
            source: source.as_bytes(),
        };
        walker.collect(tree.root_node(), 0, 0, false, &mut symbols);
        Some(symbols)
    }

    fn parser(&mut self, grammar: Grammar) -> Option<&mut Parser> {
        if !self.parsers.contains_key(&grammar) {
            let mut parser = Parser::new();
            if let Err(err) = parser.set_language(&grammar.language()) {
                warn!("failed to load {:?} grammar: {}", grammar, err);
                return None;
            }
            self.parsers.insert(grammar, parser);
        }
        self.parsers.get_mut(&grammar)
    }
}

impl SymbolProvider for OutlineProvider {
    fn document_symbols(&mut self, path: &Path) -> Option<Vec<DocumentSymbol>> {
        let Some(grammar) = Grammar::for_path(path) else {
            debug!("no outline grammar for {}", path.display());
            return None;
        };
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                debug!("cannot read {}: {}", path.display(), err);
                return None;
            }
        };
        self.outline(grammar, &source)
    }
}

struct Walker<'s> {
    grammar: Grammar,
    source: &'s [u8],
}

impl Walker<'_> {
    fn collect(
        &self,
        node: Node<'_>,
        symbol_depth: usize,
        syntax_depth: usize,
        in_function: bool,
        out: &mut Vec<DocumentSymbol>,
    ) {
        if syntax_depth >= MAX_SYNTAX_DEPTH {
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match self.classify(child, in_function) {
                Some((kind, name)) if symbol_depth < MAX_SYMBOL_DEPTH => {
                    let mut children = Vec::new();
                    let is_function = matches!(
                        kind,
                        SymbolKind::Function | SymbolKind::Method | SymbolKind::Constructor
                    );
                    self.collect(
                        child,
                        symbol_depth + 1,
                        syntax_depth + 1,
                        in_function || is_function,
                        &mut children,
                    );
                    out.push(DocumentSymbol {
                        name,
                        kind,
                        range: range_of(child),
                        children,
                    });
                }
                Some(_) => {}
                None => self.collect(child, symbol_depth, syntax_depth + 1, in_function, out),
            }
        }
    }

    fn classify(&self, node: Node<'_>, in_function: bool) -> Option<(SymbolKind, String)> {
        let kind = match self.grammar {
            Grammar::Rust => rust_kind(node, in_function)?,
            Grammar::Python => python_kind(node)?,
            Grammar::JavaScript | Grammar::TypeScript | Grammar::Tsx => {
                script_kind(node, in_function)?
            }
            Grammar::Go => go_kind(node, in_function)?,
        };
        let name = self.name_of(node)?;
        Some((kind, name))
    }

    fn name_of(&self, node: Node<'_>) -> Option<String> {
        let name_node = match (self.grammar, node.kind()) {
            (Grammar::Rust, "impl_item") => {
                let ty = node.child_by_field_name("type")?;
                match ty.kind() {
                    "generic_type" => ty.child_by_field_name("type")?,
                    _ => ty,
                }
            }
            (_, "property_identifier") => node,
            _ => node.child_by_field_name("name")?,
        };
        let text = name_node.utf8_text(self.source).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

fn parent_kind(node: Node<'_>) -> Option<&'static str> {
    node.parent().map(|parent| parent.kind())
}

fn rust_kind(node: Node<'_>, in_function: bool) -> Option<SymbolKind> {
    let kind = match node.kind() {
        "function_item" | "function_signature_item" => {
            if parent_kind(node) == Some("declaration_list") {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            }
        }
        "struct_item" | "union_item" => SymbolKind::Struct,
        "enum_item" => SymbolKind::Enum,
        "enum_variant" => SymbolKind::EnumMember,
        "trait_item" => SymbolKind::Interface,
        "mod_item" => SymbolKind::Module,
        "field_declaration" => SymbolKind::Field,
        // Methods of `impl Foo` nest under `Foo`.
        "impl_item" => SymbolKind::Struct,
        "macro_definition" => SymbolKind::Function,
        "const_item" if !in_function => SymbolKind::Constant,
        "static_item" if !in_function => SymbolKind::Variable,
        _ => return None,
    };
    Some(kind)
}

fn python_kind(node: Node<'_>) -> Option<SymbolKind> {
    match node.kind() {
        "class_definition" => Some(SymbolKind::Class),
        "function_definition" => {
            let mut parent = node.parent();
            if let Some(decorated) = parent.filter(|p| p.kind() == "decorated_definition") {
                parent = decorated.parent();
            }
            let in_class = parent
                .filter(|parent| parent.kind() == "block")
                .and_then(|block| block.parent())
                .map(|owner| owner.kind() == "class_definition")
                .unwrap_or(false);
            if in_class {
                Some(SymbolKind::Method)
            } else {
                Some(SymbolKind::Function)
            }
        }
        _ => None,
    }
}

fn script_kind(node: Node<'_>, in_function: bool) -> Option<SymbolKind> {
    let kind = match node.kind() {
        "class_declaration" | "abstract_class_declaration" | "class" => {
            node.child_by_field_name("name")?;
            SymbolKind::Class
        }
        "function_declaration" | "generator_function_declaration" => SymbolKind::Function,
        "method_definition" | "method_signature" | "abstract_method_signature" => {
            SymbolKind::Method
        }
        "interface_declaration" => SymbolKind::Interface,
        "enum_declaration" => SymbolKind::Enum,
        "enum_assignment" => SymbolKind::EnumMember,
        "property_identifier" if parent_kind(node) == Some("enum_body") => {
            SymbolKind::EnumMember
        }
        "internal_module" | "module" => SymbolKind::Namespace,
        "public_field_definition" | "field_definition" => SymbolKind::Field,
        "property_signature" => SymbolKind::Property,
        "variable_declarator" if !in_function => {
            let value = node.child_by_field_name("value")?;
            match value.kind() {
                "arrow_function" | "function_expression" | "function" => SymbolKind::Function,
                "class" => SymbolKind::Class,
                _ => return None,
            }
        }
        _ => return None,
    };
    // JavaScript field definitions name their key `property`.
    if node.kind() == "field_definition" && node.child_by_field_name("name").is_none() {
        return None;
    }
    Some(kind)
}

fn go_kind(node: Node<'_>, in_function: bool) -> Option<SymbolKind> {
    let kind = match node.kind() {
        "function_declaration" => SymbolKind::Function,
        "method_declaration" => SymbolKind::Method,
        "type_spec" => match node.child_by_field_name("type").map(|ty| ty.kind()) {
            Some("struct_type") => SymbolKind::Struct,
            Some("interface_type") => SymbolKind::Interface,
            _ => SymbolKind::Class,
        },
        "field_declaration" => SymbolKind::Field,
        "method_elem" | "method_spec" => SymbolKind::Method,
        "const_spec" if !in_function => SymbolKind::Constant,
        "var_spec" if !in_function => SymbolKind::Variable,
        _ => return None,
    };
    Some(kind)
}

fn range_of(node: Node<'_>) -> Range {
    let start = node.start_position();
    let end = node.end_position();
    Range::new(
        Position::new(start.row as u32, start.column as u32),
        Position::new(end.row as u32, end.column as u32),
    )
}
